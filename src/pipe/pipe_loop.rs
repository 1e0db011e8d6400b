use super::completion::{CompletionSender, PendingCompletion};
use super::dispatch::DispatchSender;
use crate::context::{adapt_request, Completion, RequestContext};
use crate::runtime::hooks::WaitOutcome;
use crate::runtime::telemetry::Telemetry;
use crate::worker::{CompletionCallback, SharedWorker, WorkRequest, WorkerEnv};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Why a pipe loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeExit {
    /// The thread started draining, or the run was shut down.
    Cancelled,
    /// Every script thread of the worker is gone, so nothing can accept work.
    DispatchClosed,
}

/// Per-thread loop moving work from a worker handle into the worker's dispatch channel.
pub(crate) struct PipeLoop<P, R> {
    thread: usize,
    worker: Arc<str>,
    handle: SharedWorker<P, R>,
    script_path: String,
    env: WorkerEnv,
    dispatch: DispatchSender<P, R>,
    completions: CompletionSender<R>,
    telemetry: Arc<Telemetry>,
    drain: CancellationToken,
    shutdown: CancellationToken,
}

pub(crate) struct PipeLoopParams<P, R> {
    pub thread: usize,
    pub handle: SharedWorker<P, R>,
    pub dispatch: DispatchSender<P, R>,
    pub completions: CompletionSender<R>,
    pub telemetry: Arc<Telemetry>,
    /// Per-thread token; stops the loop from taking new work.
    pub drain: CancellationToken,
    /// Run token; the only thing allowed to abandon a request already taken from the worker.
    pub shutdown: CancellationToken,
}

struct Prepared<P, R> {
    context: RequestContext<P, R>,
    completion: Completion<R>,
    callback: Option<CompletionCallback<R>>,
}

impl<P, R> PipeLoop<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    /// Captures the worker's static configuration; it is read once per activation.
    pub(crate) fn new(params: PipeLoopParams<P, R>) -> Self {
        let PipeLoopParams {
            thread,
            handle,
            dispatch,
            completions,
            telemetry,
            drain,
            shutdown,
        } = params;

        Self {
            thread,
            worker: Arc::from(handle.identity()),
            script_path: handle.script_path().to_owned(),
            env: handle.environment().clone(),
            handle,
            dispatch,
            completions,
            telemetry,
            drain,
            shutdown,
        }
    }

    #[tracing::instrument(
        name = "pipe_loop",
        skip_all,
        fields(worker = %self.worker, thread = self.thread)
    )]
    pub(crate) async fn run(self) -> PipeExit {
        tracing::info!(worker = %self.worker, thread = self.thread, "pipe loop started");

        let exit = loop {
            let provided = tokio::select! {
                biased;
                _ = self.drain.cancelled() => WaitOutcome::Cancelled,
                request = self.handle.provide_work() => WaitOutcome::Ready(request),
            };
            let request = match provided {
                WaitOutcome::Ready(request) => request,
                WaitOutcome::Cancelled => break PipeExit::Cancelled,
            };

            let Some(prepared) = self.prepare(request) else {
                continue;
            };
            let Prepared {
                context,
                completion,
                callback,
            } = prepared;

            tracing::info!(
                worker = %self.worker,
                thread = self.thread,
                "queue the worker request"
            );

            // Draining does not interrupt the hand-off: a request taken from the worker
            // reaches the engine unless the whole run is shutting down.
            let pushed = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => WaitOutcome::Cancelled,
                result = self.dispatch.send(context) => WaitOutcome::Ready(result),
            };
            match pushed {
                WaitOutcome::Ready(Ok(())) => self.telemetry.record_piped_request(),
                WaitOutcome::Ready(Err(_)) => {
                    tracing::warn!(
                        worker = %self.worker,
                        thread = self.thread,
                        "dispatch channel closed; stopping pipe loop"
                    );
                    break PipeExit::DispatchClosed;
                }
                WaitOutcome::Cancelled => {
                    tracing::debug!(
                        worker = %self.worker,
                        thread = self.thread,
                        "run cancelled while handing off a request; it was never dispatched"
                    );
                    break PipeExit::Cancelled;
                }
            }

            if let Some(callback) = callback {
                let submitted = self.completions.submit(PendingCompletion {
                    worker: self.worker.clone(),
                    thread: self.thread,
                    completion,
                    callback,
                });
                if !submitted {
                    tracing::warn!(
                        worker = %self.worker,
                        thread = self.thread,
                        "completion dispatcher stopped; callback will not fire"
                    );
                }
            }
        };

        tracing::info!(
            worker = %self.worker,
            thread = self.thread,
            exit = ?exit,
            "pipe loop exited"
        );
        exit
    }

    fn prepare(&self, request: Option<WorkRequest<P, R>>) -> Option<Prepared<P, R>> {
        let WorkRequest {
            payload,
            output,
            parameters,
            on_complete,
        } = request.unwrap_or_default();

        let (mut context, completion) = match payload {
            None => {
                tracing::debug!(
                    worker = %self.worker,
                    thread = self.thread,
                    "worker provided no payload; dispatching an empty invocation"
                );
                self.telemetry.record_empty_invocation();
                RequestContext::empty(self.worker.clone(), self.thread)
            }
            Some(payload) => match adapt_request(payload, &self.script_path, &self.env) {
                Ok(adapted) => RequestContext::new(self.worker.clone(), self.thread, adapted),
                Err(err) => {
                    tracing::error!(
                        worker = %self.worker,
                        thread = self.thread,
                        error = %err,
                        "error creating request for worker"
                    );
                    self.telemetry.record_dropped_request();
                    return None;
                }
            },
        };

        context.attach(output, parameters);
        Some(Prepared {
            context,
            completion,
            callback: on_complete,
        })
    }
}
