//! Blocking HTTP convenience layer over `reqwest`.
//!
//! # Overview
//! Describe a request as plain data (`HttpRequest`: URL, method, headers,
//! query parameters, optional JSON / URL-encoded / multipart body), execute
//! it, and get back an `HttpResponse` holding the status code, every header
//! value and the complete body bytes.
//!
//! # Design
//! - `HttpClient` owns one `reqwest::blocking::Client`; `build_request`
//!   is the pure mapping step and `execute` adds the network round-trip.
//! - Free functions (`execute`, `request_with_json`, ...) run on a lazily
//!   created process-wide client configured from the environment.
//! - Non-2xx statuses are returned as data; `HttpResponse::error_for_status`
//!   opts into treating them as errors.
//!
//! ```no_run
//! use easy_http::HttpRequest;
//!
//! # fn main() -> easy_http::Result<()> {
//! let response = easy_http::execute(
//!     &HttpRequest::get("https://example.com/search")
//!         .header("my-app-id", "easy-http")
//!         .query("q", "rust"),
//! )?;
//! println!("{} {}", response.status, response.text()?);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod http;

pub use client::{
    default_client, execute, request_with_form_url_encoded, request_with_json,
    request_with_multipart, request_without_body, HttpClient,
};
pub use config::ClientConfig;
pub use error::{HttpError, Result};
pub use http::{FormField, Headers, HttpMethod, HttpRequest, HttpResponse, Params, RequestBody};
