use crate::context::RequestContext;
use anyhow::Error as AnyError;
use core::future::Future;
use core::pin::Pin;

pub type RuntimeFuture<'a> = Pin<Box<dyn Future<Output = Result<(), RuntimeError>> + Send + 'a>>;

/// Error surfaced by a script runtime while executing one request context.
///
/// Runtime errors are local to the request: the pool logs them, counts them, and still
/// completes the context so the owner's callback fires.
#[derive(Debug)]
pub struct RuntimeError {
    source: AnyError,
}

impl RuntimeError {
    pub fn new(source: AnyError) -> Self {
        Self { source }
    }

    pub fn into_source(self) -> AnyError {
        self.source
    }
}

impl From<AnyError> for RuntimeError {
    fn from(source: AnyError) -> Self {
        Self::new(source)
    }
}

impl core::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "script runtime error: {}", self.source)
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Execution engine bound to the pool's script threads.
///
/// The pool treats the runtime as a black box: it hands over a [`RequestContext`], waits
/// for the returned future, and then fires the context's completion signal. The runtime
/// writes output through [`RequestContext::output`] and stores the script's return value
/// with [`RequestContext::set_handler_return`] before the future resolves.
pub trait ScriptRuntime<P, R>: Send + Sync + 'static {
    /// Executes one unit of work. Called from the script thread that received the context.
    fn execute<'a>(&'a self, context: &'a mut RequestContext<P, R>) -> RuntimeFuture<'a>;
}
