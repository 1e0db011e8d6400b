pub mod context;
pub mod pipe;
pub mod pool;
pub mod runtime;
pub mod worker;

pub use context::{
    adapt_request, Abandoned, AdaptError, AdaptedRequest, Completion, OutputSink, RequestContext,
    ResponseRecorder,
};
pub use pipe::PipeExit;
pub use pool::{
    LifecycleError, PoolError, ReservationError, ReservationPlan, ThreadPool, ThreadSlot,
    ThreadState,
};
pub use runtime::config::{PoolConfig, PoolConfigBuilder, PoolConfigParams};
pub use runtime::engine::{RuntimeError, RuntimeFuture, ScriptRuntime};
pub use runtime::fatal::FatalErrorHandler;
pub use runtime::runner::Runner;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use worker::{
    CompletionCallback, DefaultWorker, Registry, RegistryError, SharedWorker, ThreadCounters,
    WorkFuture, WorkRequest, WorkerEnv, WorkerHandle, WorkerTable,
};
