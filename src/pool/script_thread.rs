use crate::pipe::DispatchReceiver;
use crate::runtime::engine::ScriptRuntime;
use crate::runtime::hooks::WaitOutcome;
use crate::runtime::telemetry::Telemetry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Engine side of a pool thread: executes contexts taken from its worker's dispatch channel.
pub(crate) struct ScriptThread<P, R> {
    pub thread: usize,
    pub worker: Arc<str>,
    pub dispatch: DispatchReceiver<P, R>,
    pub runtime: Arc<dyn ScriptRuntime<P, R>>,
    pub telemetry: Arc<Telemetry>,
    pub shutdown: CancellationToken,
}

impl<P, R> ScriptThread<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    #[tracing::instrument(
        name = "script_thread",
        skip_all,
        fields(worker = %self.worker, thread = self.thread)
    )]
    pub(crate) async fn run(self) {
        loop {
            let received = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => WaitOutcome::Cancelled,
                context = self.dispatch.recv() => WaitOutcome::Ready(context),
            };
            let mut context = match received {
                WaitOutcome::Ready(Some(context)) => context,
                WaitOutcome::Ready(None) => {
                    tracing::debug!(
                        worker = %self.worker,
                        thread = self.thread,
                        "dispatch channel closed"
                    );
                    break;
                }
                WaitOutcome::Cancelled => break,
            };

            // Dispatched work always runs to completion, even if the thread starts draining.
            if let Err(err) = self.runtime.execute(&mut context).await {
                tracing::error!(
                    worker = %self.worker,
                    thread = self.thread,
                    error = %err,
                    "script runtime failed"
                );
                self.telemetry.record_runtime_error();
            }

            let delivered = context.complete();
            tracing::trace!(
                worker = %self.worker,
                thread = self.thread,
                delivered,
                "request context completed"
            );
        }

        tracing::debug!(worker = %self.worker, thread = self.thread, "script thread stopped");
    }
}
