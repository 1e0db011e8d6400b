use crate::context::RequestContext;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

pub type DispatchSender<P, R> = mpsc::Sender<RequestContext<P, R>>;

/// Receiving end of a worker's dispatch channel, shared by all of its script threads.
pub struct DispatchReceiver<P, R> {
    inner: Arc<Mutex<mpsc::Receiver<RequestContext<P, R>>>>,
}

impl<P, R> Clone for DispatchReceiver<P, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P, R> DispatchReceiver<P, R> {
    /// Next dispatched context, or `None` once every pipe loop sender is gone.
    ///
    /// Cancel safe: dropping the future never loses a context.
    pub async fn recv(&self) -> Option<RequestContext<P, R>> {
        self.inner.lock().await.recv().await
    }
}

/// Contexts sitting in the channel that no script thread has taken yet.
pub(crate) fn backlog<P, R>(tx: &DispatchSender<P, R>) -> usize {
    tx.max_capacity() - tx.capacity()
}

pub fn dispatch_channel<P, R>(capacity: usize) -> (DispatchSender<P, R>, DispatchReceiver<P, R>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        tx,
        DispatchReceiver {
            inner: Arc::new(Mutex::new(rx)),
        },
    )
}
