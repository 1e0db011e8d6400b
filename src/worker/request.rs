use crate::context::OutputSink;
use bytes::Bytes;
use hyper::Request;
use std::fmt;
use std::sync::Arc;

/// Callback fired once with the script's return value after the request completed.
pub type CompletionCallback<R> = Box<dyn FnOnce(Option<R>) + Send + 'static>;

/// One unit of work provided by a worker handle.
///
/// `payload` may be absent, in which case the pool runs the worker script without an
/// inbound request (warm-up or administrative invocations). `output` must be set whenever
/// the caller wants to read the produced output back.
pub struct WorkRequest<P, R> {
    pub payload: Option<Request<Bytes>>,
    pub output: Option<Arc<dyn OutputSink>>,
    pub parameters: Option<P>,
    pub on_complete: Option<CompletionCallback<R>>,
}

impl<P, R> WorkRequest<P, R> {
    pub fn new(payload: Request<Bytes>) -> Self {
        Self {
            payload: Some(payload),
            ..Self::empty()
        }
    }

    /// A request without payload, output, parameters, or callback.
    pub fn empty() -> Self {
        Self {
            payload: None,
            output: None,
            parameters: None,
            on_complete: None,
        }
    }

    pub fn with_output(mut self, output: Arc<dyn OutputSink>) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_parameters(mut self, parameters: P) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(Option<R>) + Send + 'static,
    {
        self.on_complete = Some(Box::new(callback));
        self
    }
}

impl<P, R> Default for WorkRequest<P, R> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<P: fmt::Debug, R> fmt::Debug for WorkRequest<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkRequest")
            .field("payload", &self.payload)
            .field("has_output", &self.output.is_some())
            .field("parameters", &self.parameters)
            .field("has_callback", &self.on_complete.is_some())
            .finish()
    }
}
