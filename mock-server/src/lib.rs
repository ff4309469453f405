//! Recording HTTP server for exercising HTTP clients over real sockets.
//!
//! # Design
//! Every request, whatever its method or path, hits a single fallback
//! handler that captures it into a `RecordedRequest` and answers with the
//! next queued `MockResponse` (or `200` with an empty body when the queue is
//! empty). Tests drive the server from synchronous code, so the shared
//! `Recorder` sits behind a `std::sync::Mutex` that is never held across an
//! `.await`.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::{
    body::{to_bytes, Body},
    extract::{FromRequest, Multipart, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::oneshot};

const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// A canned response served for the next incoming request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: Vec<u8>,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self::new(200)
    }
}

impl MockResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// `200 OK` carrying `body` as `application/json`.
    pub fn json(body: &str) -> Self {
        Self::new(200)
            .header("content-type", "application/json")
            .body(body)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

impl IntoResponse for MockResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        for (name, value) in self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                (Ok(name), Ok(value)) => {
                    response.headers_mut().append(name, value);
                }
                _ => tracing::warn!(%name, "skipping invalid mock response header"),
            }
        }
        response
    }
}

/// One part of a `multipart/form-data` body as the server received it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedPart {
    pub name: Option<String>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl RecordedPart {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// A request captured by the server, kept as plain data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Parsed parts when the body was `multipart/form-data`, empty otherwise.
    pub parts: Vec<RecordedPart>,
}

impl RecordedRequest {
    /// First value of header `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_values(name).into_iter().next()
    }

    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .collect()
    }

    /// Decoded query-string pairs in the order they appeared.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        serde_urlencoded::from_str(self.query.as_deref().unwrap_or_default()).unwrap_or_default()
    }

    /// Decoded `application/x-www-form-urlencoded` body pairs.
    pub fn form_pairs(&self) -> Vec<(String, String)> {
        serde_urlencoded::from_bytes(&self.body).unwrap_or_default()
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Multipart parts submitted under field `name`.
    pub fn parts_named(&self, name: &str) -> Vec<&RecordedPart> {
        self.parts
            .iter()
            .filter(|part| part.name.as_deref() == Some(name))
            .collect()
    }
}

#[derive(Debug, Default)]
struct Journal {
    queue: VecDeque<MockResponse>,
    requests: VecDeque<RecordedRequest>,
}

/// Shared queue of canned responses and log of received requests.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    inner: Arc<Mutex<Journal>>,
}

impl Recorder {
    pub fn enqueue(&self, response: MockResponse) {
        self.lock().queue.push_back(response);
    }

    /// Remove and return the oldest recorded request.
    pub fn take_request(&self) -> Option<RecordedRequest> {
        self.lock().requests.pop_front()
    }

    /// Number of recorded requests not yet taken.
    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    fn record(&self, request: RecordedRequest) -> MockResponse {
        let mut journal = self.lock();
        journal.requests.push_back(request);
        journal.queue.pop_front().unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, Journal> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub fn app(recorder: Recorder) -> Router {
    Router::new().fallback(record).with_state(recorder)
}

pub async fn run(listener: TcpListener, recorder: Recorder) -> Result<(), std::io::Error> {
    axum::serve(listener, app(recorder)).await
}

async fn record(State(recorder): State<Recorder>, request: Request) -> Response {
    match capture(request).await {
        Ok(recorded) => {
            tracing::info!(
                method = %recorded.method,
                path = %recorded.path,
                query = recorded.query.as_deref().unwrap_or_default(),
                body_len = recorded.body.len(),
                parts = recorded.parts.len(),
                "recorded request"
            );
            recorder.record(recorded).into_response()
        }
        Err(status) => status.into_response(),
    }
}

async fn capture(request: Request) -> Result<RecordedRequest, StatusCode> {
    let (head, body) = request.into_parts();
    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| StatusCode::PAYLOAD_TOO_LARGE)?;

    let mut recorded = RecordedRequest {
        method: head.method.to_string(),
        path: head.uri.path().to_string(),
        query: head.uri.query().map(str::to_string),
        headers: header_pairs(&head.headers),
        body: body.to_vec(),
        parts: Vec::new(),
    };

    if is_multipart(&head.headers) {
        let request = Request::from_parts(head, Body::from(body));
        recorded.parts = read_parts(request).await?;
    }
    Ok(recorded)
}

async fn read_parts(request: Request) -> Result<Vec<RecordedPart>, StatusCode> {
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let mut parts = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        let name = field.name().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
        parts.push(RecordedPart {
            name,
            file_name,
            content_type,
            data: data.to_vec(),
        });
    }
    Ok(parts)
}

fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"))
}

/// A `Recorder`-backed server running on its own thread and runtime.
///
/// Binds `127.0.0.1` on a random port. Dropping the handle signals a
/// graceful shutdown.
#[derive(Debug)]
pub struct MockServer {
    addr: SocketAddr,
    recorder: Recorder,
    shutdown: Option<oneshot::Sender<()>>,
}

impl MockServer {
    pub fn start() -> Result<Self, std::io::Error> {
        let std_listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let addr = std_listener.local_addr()?;
        std_listener.set_nonblocking(true)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let recorder = Recorder::default();
        let router = app(recorder.clone());
        let (shutdown, signal) = oneshot::channel::<()>();

        std::thread::spawn(move || {
            runtime.block_on(async move {
                let listener = match TcpListener::from_std(std_listener) {
                    Ok(listener) => listener,
                    Err(err) => {
                        tracing::error!(%err, "mock server could not adopt listener");
                        return;
                    }
                };
                let stopped = async {
                    let _ = signal.await;
                };
                if let Err(err) = axum::serve(listener, router)
                    .with_graceful_shutdown(stopped)
                    .await
                {
                    tracing::error!(%err, "mock server stopped with error");
                }
            });
        });

        Ok(Self {
            addr,
            recorder,
            shutdown: Some(shutdown),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Absolute URL for `path` on this server.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("http://{}{path}", self.addr)
        } else {
            format!("http://{}/{path}", self.addr)
        }
    }

    pub fn enqueue(&self, response: MockResponse) {
        self.recorder.enqueue(response);
    }

    pub fn take_request(&self) -> Option<RecordedRequest> {
        self.recorder.take_request()
    }

    pub fn request_count(&self) -> usize {
        self.recorder.request_count()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorded(method: &str, path: &str) -> RecordedRequest {
        RecordedRequest {
            method: method.to_string(),
            path: path.to_string(),
            query: None,
            headers: Vec::new(),
            body: Vec::new(),
            parts: Vec::new(),
        }
    }

    #[test]
    fn default_response_is_empty_ok() {
        let response = MockResponse::default();
        assert_eq!(response.status, 200);
        assert!(response.headers.is_empty());
        assert!(response.body.is_empty());
    }

    #[test]
    fn json_response_sets_content_type() {
        let response = MockResponse::json(r#"{"id":1}"#);
        assert_eq!(
            response.headers,
            vec![("content-type".to_string(), "application/json".to_string())]
        );
        assert_eq!(response.body, br#"{"id":1}"#);
    }

    #[test]
    fn recorder_serves_queue_in_order_then_default() {
        let recorder = Recorder::default();
        recorder.enqueue(MockResponse::new(201));
        recorder.enqueue(MockResponse::new(404));

        assert_eq!(recorder.record(recorded("GET", "/a")).status, 201);
        assert_eq!(recorder.record(recorded("GET", "/b")).status, 404);
        assert_eq!(recorder.record(recorded("GET", "/c")).status, 200);

        assert_eq!(recorder.request_count(), 3);
        assert_eq!(recorder.take_request().unwrap().path, "/a");
        assert_eq!(recorder.take_request().unwrap().path, "/b");
        assert_eq!(recorder.take_request().unwrap().path, "/c");
        assert!(recorder.take_request().is_none());
    }

    #[test]
    fn header_lookup_ignores_case() {
        let mut request = recorded("GET", "/");
        request.headers = vec![
            ("x-tag".to_string(), "a".to_string()),
            ("X-Tag".to_string(), "b".to_string()),
        ];
        assert_eq!(request.header("X-TAG"), Some("a"));
        assert_eq!(request.header_values("x-tag"), vec!["a", "b"]);
        assert!(request.header("missing").is_none());
    }

    #[test]
    fn query_pairs_are_decoded_in_order() {
        let mut request = recorded("GET", "/");
        request.query = Some("name=a%20b&id=1&name=c".to_string());
        assert_eq!(
            request.query_pairs(),
            vec![
                ("name".to_string(), "a b".to_string()),
                ("id".to_string(), "1".to_string()),
                ("name".to_string(), "c".to_string()),
            ]
        );
    }

    #[test]
    fn form_pairs_decode_plus_as_space() {
        let mut request = recorded("POST", "/");
        request.body = b"greeting=hello+world&n=2".to_vec();
        assert_eq!(
            request.form_pairs(),
            vec![
                ("greeting".to_string(), "hello world".to_string()),
                ("n".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn is_multipart_checks_content_type_prefix() {
        let mut headers = HeaderMap::new();
        assert!(!is_multipart(&headers));
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("multipart/form-data; boundary=xyz"),
        );
        assert!(is_multipart(&headers));
    }
}
