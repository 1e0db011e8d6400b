use anyhow::Result;
use bytes::{Bytes, BytesMut};
use hyper::header::{HeaderName, HeaderValue};
use hyper::{HeaderMap, Response, StatusCode};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Destination for the output produced while a request context executes.
///
/// Sinks are shared between the work producer, which reads the result once the completion
/// callback fired, and the script thread, which writes into it.
pub trait OutputSink: Send + Sync {
    fn set_status(&self, status: StatusCode);

    fn append_header(&self, name: HeaderName, value: HeaderValue);

    fn write(&self, chunk: &[u8]) -> Result<()>;
}

/// In-memory sink that records status, headers, and body for later inspection.
#[derive(Debug, Default)]
pub struct ResponseRecorder {
    state: Mutex<RecordedResponse>,
}

#[derive(Debug, Default)]
struct RecordedResponse {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

impl ResponseRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RecordedResponse> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Status written so far, `200 OK` when nothing set one explicitly.
    pub fn status(&self) -> StatusCode {
        self.state().status.unwrap_or(StatusCode::OK)
    }

    pub fn headers(&self) -> HeaderMap {
        self.state().headers.clone()
    }

    pub fn body(&self) -> Bytes {
        Bytes::copy_from_slice(&self.state().body)
    }

    /// Builds a response from everything recorded so far.
    pub fn to_response(&self) -> Response<Bytes> {
        let state = self.state();
        let mut response = Response::new(Bytes::copy_from_slice(&state.body));
        *response.status_mut() = state.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = state.headers.clone();
        response
    }
}

impl OutputSink for ResponseRecorder {
    fn set_status(&self, status: StatusCode) {
        self.state().status = Some(status);
    }

    fn append_header(&self, name: HeaderName, value: HeaderValue) {
        self.state().headers.append(name, value);
    }

    fn write(&self, chunk: &[u8]) -> Result<()> {
        self.state().body.extend_from_slice(chunk);
        Ok(())
    }
}
