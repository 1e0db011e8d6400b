use super::counters::ThreadCounters;
use super::handle::{WorkFuture, WorkerEnv, WorkerHandle};
use super::request::WorkRequest;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

/// In-process worker handle backed by a bounded FIFO queue.
///
/// The queue holds `max(min_threads, 1)` requests; [`DefaultWorker::inject_work`] waits for
/// room instead of dropping work.
pub struct DefaultWorker<P = Value, R = Value> {
    identity: String,
    script_path: String,
    env: WorkerEnv,
    min_threads: usize,
    tx: mpsc::Sender<WorkRequest<P, R>>,
    rx: Mutex<mpsc::Receiver<WorkRequest<P, R>>>,
    counters: ThreadCounters,
}

impl<P, R> DefaultWorker<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    pub fn new(
        identity: impl Into<String>,
        script_path: impl Into<String>,
        min_threads: usize,
        env: WorkerEnv,
    ) -> Self {
        let (tx, rx) = mpsc::channel(min_threads.max(1));
        Self {
            identity: identity.into(),
            script_path: script_path.into(),
            env,
            min_threads,
            tx,
            rx: Mutex::new(rx),
            counters: ThreadCounters::new(),
        }
    }

    /// Queues a request for a pipe loop to pick up, waiting while the queue is full.
    pub async fn inject_work(&self, request: WorkRequest<P, R>) {
        // The receiver lives in `self`, so the queue cannot be closed here.
        let _ = self.tx.send(request).await;
    }

    /// Blocking variant of [`DefaultWorker::inject_work`] for producers on plain threads.
    ///
    /// Panics when called from within an asynchronous execution context.
    pub fn inject_work_blocking(&self, request: WorkRequest<P, R>) {
        let _ = self.tx.blocking_send(request);
    }

    pub fn counters(&self) -> &ThreadCounters {
        &self.counters
    }

    pub fn active_threads(&self) -> i32 {
        self.counters.active()
    }

    pub fn draining_threads(&self) -> i32 {
        self.counters.draining()
    }
}

impl<P, R> WorkerHandle<P, R> for DefaultWorker<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    fn identity(&self) -> &str {
        &self.identity
    }

    fn script_path(&self) -> &str {
        &self.script_path
    }

    fn environment(&self) -> &WorkerEnv {
        &self.env
    }

    fn min_threads(&self) -> usize {
        self.min_threads
    }

    fn notify_thread_activated(&self, _thread: usize) {
        self.counters.record_activated();
    }

    fn notify_thread_draining(&self, _thread: usize) {
        self.counters.record_draining();
    }

    fn notify_thread_deactivated(&self, _thread: usize) {
        self.counters.record_deactivated();
    }

    fn provide_work(&self) -> WorkFuture<'_, P, R> {
        Box::pin(async move { self.rx.lock().await.recv().await })
    }
}
