//! Request contexts handed to the script runtime, the adaptation step that builds them,
//! and the output sinks they write into.

pub mod adapt;
pub mod request_context;
pub mod sink;

pub use adapt::{adapt_request, AdaptError, AdaptedRequest};
pub use request_context::{Abandoned, Completion, RequestContext};
pub use sink::{OutputSink, ResponseRecorder};
