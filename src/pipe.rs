//! Moving work from worker handles to script threads.
//!
//! - `pipe_loop`: one loop per active thread, pulling from a [`crate::WorkerHandle`]
//! - `dispatch`: per-worker channel shared by that worker's script threads
//! - `completion`: the pool-wide task that fires completion callbacks

pub(crate) mod completion;
pub mod dispatch;
pub mod pipe_loop;

pub use dispatch::{dispatch_channel, DispatchReceiver, DispatchSender};
pub use pipe_loop::PipeExit;
