//! Adapts inbound HTTP-shaped requests into the variable table a script runtime reads.

use crate::worker::WorkerEnv;
use bytes::Bytes;
use hyper::header::{HeaderName, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::Request;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Reasons a provided payload cannot become a request context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdaptError {
    RelativePath { path: String },
    NulInPath,
    InvalidHeader { name: String },
}

impl fmt::Display for AdaptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdaptError::RelativePath { path } => {
                write!(f, "request path {path:?} is not absolute")
            }
            AdaptError::NulInPath => write!(f, "request path contains an encoded NUL byte"),
            AdaptError::InvalidHeader { name } => {
                write!(f, "header {name} is not valid UTF-8 text")
            }
        }
    }
}

impl std::error::Error for AdaptError {}

/// A request together with the variables exposed to the worker script.
#[derive(Debug)]
pub struct AdaptedRequest {
    request: Request<Bytes>,
    variables: BTreeMap<String, String>,
}

impl AdaptedRequest {
    pub fn request(&self) -> &Request<Bytes> {
        &self.request
    }

    pub fn body(&self) -> &Bytes {
        self.request.body()
    }

    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }
}

/// Builds the script variables for `request`.
///
/// Worker environment entries are applied last and override request-derived values.
pub fn adapt_request(
    request: Request<Bytes>,
    script_path: &str,
    env: &WorkerEnv,
) -> Result<AdaptedRequest, AdaptError> {
    let uri = request.uri();
    let path = uri.path();
    if !path.starts_with('/') {
        return Err(AdaptError::RelativePath {
            path: path.to_owned(),
        });
    }
    if path.as_bytes().windows(3).any(|w| w == b"%00") {
        return Err(AdaptError::NulInPath);
    }

    let script = Path::new(script_path);
    let script_name = script
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(script_path);
    let document_root = script
        .parent()
        .map(|dir| dir.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut variables = BTreeMap::new();
    let mut set = |name: &str, value: String| {
        variables.insert(name.to_owned(), value);
    };
    set("REQUEST_METHOD", request.method().as_str().to_owned());
    set(
        "REQUEST_URI",
        uri.path_and_query()
            .map(|pq| pq.as_str().to_owned())
            .unwrap_or_else(|| path.to_owned()),
    );
    set("QUERY_STRING", uri.query().unwrap_or_default().to_owned());
    set("PATH_INFO", path.to_owned());
    set("SCRIPT_FILENAME", script_path.to_owned());
    set("SCRIPT_NAME", format!("/{script_name}"));
    set("DOCUMENT_ROOT", document_root);
    set("SERVER_PROTOCOL", format!("{:?}", request.version()));
    if let Some(host) = uri.host() {
        set("SERVER_NAME", host.to_owned());
    }
    if let Some(scheme) = uri.scheme_str() {
        set("REQUEST_SCHEME", scheme.to_owned());
        if scheme.eq_ignore_ascii_case("https") {
            set("HTTPS", "on".to_owned());
        }
    }

    for (name, value) in request.headers() {
        let value = value.to_str().map_err(|_| AdaptError::InvalidHeader {
            name: name.as_str().to_owned(),
        })?;
        variables
            .entry(header_variable(name))
            .and_modify(|existing: &mut String| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_owned());
    }

    if !variables.contains_key("SERVER_NAME") {
        if let Some(host) = variables.get("HTTP_HOST") {
            let name = host.split(':').next().unwrap_or_default().to_owned();
            variables.insert("SERVER_NAME".to_owned(), name);
        }
    }
    let body_len = request.body().len();
    if body_len > 0 && !variables.contains_key("CONTENT_LENGTH") {
        variables.insert("CONTENT_LENGTH".to_owned(), body_len.to_string());
    }

    for (name, value) in env {
        variables.insert(name.clone(), value.clone());
    }

    Ok(AdaptedRequest { request, variables })
}

fn header_variable(name: &HeaderName) -> String {
    if name == CONTENT_TYPE {
        return "CONTENT_TYPE".to_owned();
    }
    if name == CONTENT_LENGTH {
        return "CONTENT_LENGTH".to_owned();
    }
    let mut variable = String::with_capacity(name.as_str().len() + 5);
    variable.push_str("HTTP_");
    for ch in name.as_str().chars() {
        variable.push(if ch == '-' {
            '_'
        } else {
            ch.to_ascii_uppercase()
        });
    }
    variable
}
