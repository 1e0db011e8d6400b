//! Worker-facing surface split across focused submodules:
//! - `handle`: the `WorkerHandle` capability trait and its future alias
//! - `request`: `WorkRequest`, the unit of work a handle provides
//! - `counters`: lock-free lifecycle counters
//! - `default`: queue-backed in-process `DefaultWorker`
//! - `registry`: process-scoped registry and its frozen startup snapshot

mod counters;
mod default;
mod handle;
mod registry;
mod request;

pub use counters::ThreadCounters;
pub use default::DefaultWorker;
pub use handle::{WorkFuture, WorkerEnv, WorkerHandle};
pub use registry::{Registry, RegistryError, SharedWorker, WorkerTable};
pub use request::{CompletionCallback, WorkRequest};
