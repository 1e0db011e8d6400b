use super::adapt::AdaptedRequest;
use super::sink::OutputSink;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Engine-facing representation of one in-flight unit of work.
///
/// A context is created by a pipe loop and moved into the worker's dispatch channel, which
/// hands exclusive ownership to the script thread that receives it. The handler return value
/// only leaves the context through [`RequestContext::complete`], so the owner observes it
/// strictly after completion.
pub struct RequestContext<P, R> {
    worker: Arc<str>,
    thread: usize,
    request: Option<AdaptedRequest>,
    output: Option<Arc<dyn OutputSink>>,
    parameters: Option<P>,
    handler_return: Option<R>,
    done: Option<oneshot::Sender<Option<R>>>,
}

/// Receiving half of a context's completion signal.
pub struct Completion<R> {
    rx: oneshot::Receiver<Option<R>>,
}

/// The context was dropped before the engine completed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Abandoned;

impl fmt::Display for Abandoned {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request context dropped before completion")
    }
}

impl std::error::Error for Abandoned {}

impl<R> Completion<R> {
    /// Waits for the engine to complete the context and yields its handler return value.
    pub async fn wait(self) -> Result<Option<R>, Abandoned> {
        self.rx.await.map_err(|_| Abandoned)
    }
}

impl<P, R> RequestContext<P, R> {
    /// Context for an administrative invocation that carries no inbound request.
    pub fn empty(worker: Arc<str>, thread: usize) -> (Self, Completion<R>) {
        Self::build(worker, thread, None)
    }

    pub fn new(worker: Arc<str>, thread: usize, request: AdaptedRequest) -> (Self, Completion<R>) {
        Self::build(worker, thread, Some(request))
    }

    fn build(
        worker: Arc<str>,
        thread: usize,
        request: Option<AdaptedRequest>,
    ) -> (Self, Completion<R>) {
        let (tx, rx) = oneshot::channel();
        let context = Self {
            worker,
            thread,
            request,
            output: None,
            parameters: None,
            handler_return: None,
            done: Some(tx),
        };
        (context, Completion { rx })
    }

    pub(crate) fn attach(&mut self, output: Option<Arc<dyn OutputSink>>, parameters: Option<P>) {
        self.output = output;
        self.parameters = parameters;
    }

    pub fn worker(&self) -> &str {
        &self.worker
    }

    /// Pool thread whose pipe loop produced this context.
    pub fn thread(&self) -> usize {
        self.thread
    }

    pub fn request(&self) -> Option<&AdaptedRequest> {
        self.request.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.request.is_none()
    }

    pub fn output(&self) -> Option<&Arc<dyn OutputSink>> {
        self.output.as_ref()
    }

    pub fn parameters(&self) -> Option<&P> {
        self.parameters.as_ref()
    }

    pub fn take_parameters(&mut self) -> Option<P> {
        self.parameters.take()
    }

    pub fn set_handler_return(&mut self, value: R) {
        self.handler_return = Some(value);
    }

    pub fn handler_return(&self) -> Option<&R> {
        self.handler_return.as_ref()
    }

    /// Fires the completion signal with the handler return value.
    ///
    /// Returns `false` when nobody waits for the result, which is normal for requests
    /// submitted without a completion callback.
    pub(crate) fn complete(mut self) -> bool {
        let value = self.handler_return.take();
        match self.done.take() {
            Some(done) => done.send(value).is_ok(),
            None => false,
        }
    }
}

impl<P, R> fmt::Debug for RequestContext<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("worker", &self.worker)
            .field("thread", &self.thread)
            .field("request", &self.request)
            .field("has_output", &self.output.is_some())
            .field("has_parameters", &self.parameters.is_some())
            .field("completed", &self.done.is_none())
            .finish()
    }
}
