//! Error types for request construction and dispatch.
//!
//! # Design
//! Non-2xx responses are data, not errors: `HttpClient::execute` returns them
//! as `HttpResponse` values. `Status` only appears when a caller opts in via
//! `HttpResponse::error_for_status`. Transport failures from `reqwest` are
//! classified into `Timeout`, `Connection`, `Build` or `Other`.

use std::path::PathBuf;

use thiserror::Error;

use crate::http::HttpMethod;

pub type Result<T, E = HttpError> = std::result::Result<T, E>;

/// Errors returned while building, sending or reading an HTTP exchange.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The request URL could not be parsed.
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// A header name or value is not valid on the wire.
    #[error("invalid header {name:?}")]
    InvalidHeader { name: String },

    /// A body was supplied for a method that cannot carry one.
    #[error("{method} requests can't carry a body")]
    BodyNotAllowed { method: HttpMethod },

    /// The request body is not the kind the chosen helper sends.
    #[error("expected {expected} body, found {found}")]
    BodyMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// A multipart file could not be read.
    #[error("can't read multipart file {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request timeout")]
    Timeout,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("client build error: {0}")]
    Build(String),

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HttpError::Timeout
        } else if err.is_connect() {
            HttpError::Connection(err.to_string())
        } else if err.is_builder() {
            HttpError::Build(err.to_string())
        } else {
            HttpError::Other(err.to_string())
        }
    }
}

impl From<serde_json::Error> for HttpError {
    fn from(err: serde_json::Error) -> Self {
        HttpError::Serialization(err.to_string())
    }
}
