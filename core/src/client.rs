//! Dispatch of `HttpRequest` descriptors through `reqwest`.
//!
//! # Design
//! Each exchange is split in two steps, mirroring the build/parse split of
//! the descriptors themselves:
//! - `build_request` maps an `HttpRequest` onto a `reqwest` request without
//!   touching the network, so URL, header and body construction can be
//!   inspected in unit tests.
//! - `execute` sends the built request and materializes the response
//!   (status, every header value, the whole body) before the connection is
//!   handed back to the pool.
//!
//! Connection pooling, TLS and timeouts belong to `reqwest`.

use std::fs;
use std::sync::OnceLock;

use reqwest::blocking::{multipart, Client, Request, Response};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use url::{form_urlencoded, Url};

use crate::config::ClientConfig;
use crate::error::{HttpError, Result};
use crate::http::{FormField, HttpMethod, HttpRequest, HttpResponse, Params, RequestBody};

const OCTET_STREAM: &str = "application/octet-stream";

/// Blocking HTTP client that executes `HttpRequest` descriptors.
///
/// Cheap to clone: clones share one connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
}

impl HttpClient {
    /// Client with `ClientConfig::default()` settings.
    pub fn new() -> Result<Self> {
        Self::with_config(&ClientConfig::default())
    }

    pub fn with_config(config: &ClientConfig) -> Result<Self> {
        let inner = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.timeout())
            .user_agent(config.user_agent.as_str())
            .default_headers(header_map(&config.default_headers)?)
            .build()
            .inspect_err(|err| tracing::warn!(%err, "failed to build HTTP client"))?;
        Ok(Self { inner })
    }

    /// Wrap an already configured `reqwest` client.
    pub fn from_reqwest(client: Client) -> Self {
        Self { inner: client }
    }

    /// Map `request` onto a `reqwest` request.
    ///
    /// Query parameters are appended to any query already present in the
    /// URL. When a body is present its media type replaces any
    /// `Content-Type` header supplied by the caller. Multipart files are
    /// read into memory here, so an unreadable path fails before any I/O
    /// on the network.
    pub fn build_request(&self, request: &HttpRequest) -> Result<Request> {
        if request.body.is_some() && !request.method.allows_body() {
            return Err(HttpError::BodyNotAllowed {
                method: request.method,
            });
        }

        let url = request_url(&request.url, &request.query)?;
        let mut headers = header_map(&request.headers)?;
        if request.body.is_some() {
            headers.remove(CONTENT_TYPE);
        }

        let builder = self.inner.request(method(request.method), url);
        let builder = match &request.body {
            None => match request.method {
                HttpMethod::Post | HttpMethod::Put => builder.headers(headers).body(Vec::<u8>::new()),
                HttpMethod::Get | HttpMethod::Delete => builder.headers(headers),
            },
            Some(body @ RequestBody::Json(json)) => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(body.content_type()));
                builder.headers(headers).body(json.clone())
            }
            Some(RequestBody::Form(params)) => {
                let pairs: Vec<(&str, &str)> = params.pairs().collect();
                builder.headers(headers).form(&pairs)
            }
            Some(RequestBody::Multipart(fields)) => {
                builder.headers(headers).multipart(multipart_form(fields)?)
            }
        };
        Ok(builder.build()?)
    }

    /// Send `request` and read the whole response into memory.
    ///
    /// Any status code is a successful exchange; use
    /// `HttpResponse::error_for_status` to reject non-2xx answers.
    pub fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let built = self.build_request(request)?;
        tracing::debug!(
            method = %request.method,
            url = %built.url(),
            body = request.body.as_ref().map_or("none", RequestBody::kind),
            "sending request"
        );

        let response = materialize(self.inner.execute(built)?)?;
        tracing::debug!(
            status = response.status,
            body_len = response.body.len(),
            "received response"
        );
        Ok(response)
    }

    pub fn get(&self, url: &str, query: &Params) -> Result<HttpResponse> {
        let mut request = HttpRequest::get(url);
        request.query = query.clone();
        self.execute(&request)
    }

    pub fn post_json(&self, url: &str, json: &str) -> Result<HttpResponse> {
        self.execute(&HttpRequest::post(url).json(json))
    }

    pub fn put_json(&self, url: &str, json: &str) -> Result<HttpResponse> {
        self.execute(&HttpRequest::put(url).json(json))
    }

    pub fn post_form(&self, url: &str, form: &Params) -> Result<HttpResponse> {
        let mut request = HttpRequest::post(url);
        request.body = Some(RequestBody::Form(form.clone()));
        self.execute(&request)
    }

    pub fn post_multipart(&self, url: &str, fields: Vec<(String, FormField)>) -> Result<HttpResponse> {
        let mut request = HttpRequest::post(url);
        request.body = Some(RequestBody::Multipart(fields));
        self.execute(&request)
    }

    pub fn delete(&self, url: &str) -> Result<HttpResponse> {
        self.execute(&HttpRequest::delete(url))
    }
}

static DEFAULT_CLIENT: OnceLock<HttpClient> = OnceLock::new();

/// Process-wide client configured from `ClientConfig::from_env`, created on
/// first use.
pub fn default_client() -> Result<&'static HttpClient> {
    if let Some(client) = DEFAULT_CLIENT.get() {
        return Ok(client);
    }
    let client = HttpClient::with_config(&ClientConfig::from_env()?)?;
    Ok(DEFAULT_CLIENT.get_or_init(|| client))
}

/// Execute `request` on the default client.
pub fn execute(request: &HttpRequest) -> Result<HttpResponse> {
    default_client()?.execute(request)
}

/// Execute a request that must not carry a body.
pub fn request_without_body(request: &HttpRequest) -> Result<HttpResponse> {
    if let Some(body) = &request.body {
        return Err(HttpError::BodyMismatch {
            expected: "no",
            found: body.kind(),
        });
    }
    execute(request)
}

/// Execute a request carrying a raw JSON body.
pub fn request_with_json(request: &HttpRequest) -> Result<HttpResponse> {
    require_body(request, "json")?;
    execute(request)
}

/// Execute a request carrying an `application/x-www-form-urlencoded` body.
pub fn request_with_form_url_encoded(request: &HttpRequest) -> Result<HttpResponse> {
    require_body(request, "form")?;
    execute(request)
}

/// Execute a request carrying a `multipart/form-data` body.
pub fn request_with_multipart(request: &HttpRequest) -> Result<HttpResponse> {
    require_body(request, "multipart")?;
    execute(request)
}

fn require_body(request: &HttpRequest, expected: &'static str) -> Result<()> {
    if !request.method.allows_body() {
        return Err(HttpError::BodyNotAllowed {
            method: request.method,
        });
    }
    match &request.body {
        Some(body) if body.kind() == expected => Ok(()),
        Some(body) => Err(HttpError::BodyMismatch {
            expected,
            found: body.kind(),
        }),
        None => Err(HttpError::BodyMismatch {
            expected,
            found: "nothing",
        }),
    }
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Delete => Method::DELETE,
    }
}

/// Parse `raw` and append every query pair in order.
fn request_url(raw: &str, query: &Params) -> Result<Url> {
    let mut url = Url::parse(raw).map_err(|e| HttpError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    let appended: Vec<String> = query
        .pairs()
        .map(|(key, value)| {
            format!("{}={}", encode_query_component(key), encode_query_component(value))
        })
        .collect();
    if appended.is_empty() {
        return Ok(url);
    }

    let mut combined = url
        .query()
        .filter(|existing| !existing.is_empty())
        .map(str::to_string)
        .unwrap_or_default();
    for pair in appended {
        if !combined.is_empty() {
            combined.push('&');
        }
        combined.push_str(&pair);
    }
    url.set_query(Some(&combined));
    Ok(url)
}

/// Percent-encode one query key or value. Spaces become `%20`, not the
/// form encoding's `+`, which strict RFC 3986 servers read literally.
fn encode_query_component(raw: &str) -> String {
    form_urlencoded::byte_serialize(raw.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

fn header_map(headers: &[(String, String)]) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let invalid = || HttpError::InvalidHeader { name: name.clone() };
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        map.append(header_name, header_value);
    }
    Ok(map)
}

fn multipart_form(fields: &[(String, FormField)]) -> Result<multipart::Form> {
    let mut form = multipart::Form::new();
    for (name, field) in fields {
        let part = match field {
            FormField::Text(value) => multipart::Part::text(value.clone()),
            // Named after the file and typed from its extension, falling
            // back to application/octet-stream.
            FormField::File(path) => {
                let data = fs::read(path).map_err(|source| HttpError::File {
                    path: path.clone(),
                    source,
                })?;
                let mime = mime_guess::from_path(path).first_or_octet_stream();
                let part = multipart::Part::bytes(data).mime_str(mime.essence_str())?;
                match path.file_name() {
                    Some(file_name) => part.file_name(file_name.to_string_lossy().into_owned()),
                    None => part,
                }
            }
            FormField::Bytes {
                file_name,
                content_type,
                data,
            } => multipart::Part::bytes(data.clone())
                .file_name(file_name.clone())
                .mime_str(content_type.as_deref().unwrap_or(OCTET_STREAM))?,
        };
        form = form.part(name.clone(), part);
    }
    Ok(form)
}

fn materialize(response: Response) -> Result<HttpResponse> {
    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    let body = response.bytes()?.to_vec();
    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}
