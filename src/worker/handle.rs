use super::request::WorkRequest;
use core::future::Future;
use core::pin::Pin;
use std::collections::BTreeMap;

/// Environment variables applied to every invocation of a worker script.
pub type WorkerEnv = BTreeMap<String, String>;

pub type WorkFuture<'a, P, R> =
    Pin<Box<dyn Future<Output = Option<WorkRequest<P, R>>> + Send + 'a>>;

/// Capability surface implemented by producers of work for the thread pool.
///
/// Configuration accessors are read once per thread activation. Once at least one thread
/// is active the pool repeatedly awaits [`WorkerHandle::provide_work`] from that thread's
/// pipe loop and forwards each result to the worker script.
///
/// Workers are served from a shared thread budget. If the pool cannot reserve
/// [`WorkerHandle::min_threads`] threads for every registered worker, startup fails and the
/// operator has to raise the budget.
pub trait WorkerHandle<P, R>: Send + Sync + 'static {
    /// Registry key. Must be non-empty; registering a second handle with the same identity
    /// replaces the first.
    fn identity(&self) -> &str;

    /// Script resource this worker maps to.
    fn script_path(&self) -> &str;

    fn environment(&self) -> &WorkerEnv;

    /// Threads reserved for this worker at startup. Zero is legal but guarantees nothing.
    fn min_threads(&self) -> usize;

    /// A thread was assigned to this worker. Set up per-thread resources here.
    ///
    /// Called concurrently for distinct thread ids; must not block.
    fn notify_thread_activated(&self, thread: usize);

    /// The thread is about to be returned to the pool.
    fn notify_thread_draining(&self, thread: usize);

    /// The thread was returned to the pool. May arrive without a preceding drain.
    fn notify_thread_deactivated(&self, thread: usize);

    /// Resolves to the next unit of work, waiting as long as necessary.
    ///
    /// `None`, like a request without payload, makes the pipe loop run an empty invocation.
    /// The future is dropped when the thread drains, so implementations must not lose work
    /// when cancelled mid-wait.
    fn provide_work(&self) -> WorkFuture<'_, P, R>;
}
