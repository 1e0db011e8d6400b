//! Delivery of completion callbacks.
//!
//! Every pool runs a single dispatcher task that owns the waiters for all in-flight
//! requests carrying a callback. Pipe loops hand waiters over without blocking, callbacks
//! fire in whatever order their contexts complete, and the number of spawned tasks stays
//! fixed regardless of request rate.

use crate::context::Completion;
use crate::runtime::fatal::panic_message;
use crate::runtime::telemetry::Telemetry;
use crate::worker::CompletionCallback;
use futures::stream::{FuturesUnordered, StreamExt};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub(crate) struct PendingCompletion<R> {
    pub(crate) worker: Arc<str>,
    pub(crate) thread: usize,
    pub(crate) completion: Completion<R>,
    pub(crate) callback: CompletionCallback<R>,
}

pub(crate) struct CompletionSender<R> {
    tx: mpsc::UnboundedSender<PendingCompletion<R>>,
}

impl<R> Clone for CompletionSender<R> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<R> CompletionSender<R> {
    /// Hands a waiter to the dispatcher. Returns `false` if the dispatcher already stopped,
    /// in which case the callback is dropped unfired.
    pub(crate) fn submit(&self, pending: PendingCompletion<R>) -> bool {
        self.tx.send(pending).is_ok()
    }
}

/// Spawns the dispatcher.
///
/// It exits once every [`CompletionSender`] is dropped and the remaining waiters resolved,
/// or as soon as `shutdown` is cancelled, abandoning pending waiters without callbacks.
pub(crate) fn spawn_completion_dispatcher<R: Send + 'static>(
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
) -> (CompletionSender<R>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<PendingCompletion<R>>();

    let handle = tokio::spawn(async move {
        let mut waiters = FuturesUnordered::new();
        let mut intake_open = true;

        loop {
            if !intake_open && waiters.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    if !waiters.is_empty() {
                        tracing::warn!(
                            pending = waiters.len(),
                            "abandoning completion waiters at shutdown"
                        );
                    }
                    break;
                }
                pending = rx.recv(), if intake_open => match pending {
                    Some(pending) => waiters.push(deliver(pending, telemetry.clone())),
                    None => intake_open = false,
                },
                Some(()) = waiters.next(), if !waiters.is_empty() => {}
            }
        }

        tracing::debug!("completion dispatcher stopped");
    });

    (CompletionSender { tx }, handle)
}

async fn deliver<R>(pending: PendingCompletion<R>, telemetry: Arc<Telemetry>) {
    let PendingCompletion {
        worker,
        thread,
        completion,
        callback,
    } = pending;

    let value = match completion.wait().await {
        Ok(value) => value,
        Err(_) => {
            tracing::debug!(
                worker = %worker,
                thread,
                "request context dropped before completion; callback skipped"
            );
            return;
        }
    };

    match catch_unwind(AssertUnwindSafe(move || callback(value))) {
        Ok(()) => telemetry.record_completion_delivered(),
        Err(panic) => {
            tracing::error!(
                worker = %worker,
                thread,
                panic = %panic_message(panic.as_ref()),
                "completion callback panicked"
            );
        }
    }
}
