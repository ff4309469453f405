//! Request and response descriptors.
//!
//! # Design
//! These types describe an HTTP exchange as plain owned data. `HttpRequest`
//! is assembled with consuming builder methods and handed to
//! `HttpClient::execute`, which maps it onto `reqwest`. `HttpResponse` holds
//! the fully read body: the underlying stream is gone once the connection is
//! released, so nothing here is lazy.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{HttpError, Result};

/// Header multimap. Order is kept and names may repeat.
pub type Headers = Vec<(String, String)>;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Whether a request body may be attached. Only GET refuses one.
    pub fn allows_body(&self) -> bool {
        !matches!(self, HttpMethod::Get)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = HttpError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            _ => Err(HttpError::Other(format!("unsupported HTTP method {s:?}"))),
        }
    }
}

/// Ordered multimap of string keys to lists of values.
///
/// Used for query strings and URL-encoded forms. Keys keep the position of
/// their first insertion; values keep insertion order under their key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(String, Vec<String>)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `value` under `key`, after any values already there.
    pub fn append(&mut self, key: impl Into<String>, value: impl ToString) {
        let value = value.to_string();
        self.values_mut(key.into()).push(value);
    }

    /// Replace every value under `key`. An empty list keeps the key but
    /// contributes nothing to `pairs`.
    pub fn insert<V: ToString>(&mut self, key: impl Into<String>, values: impl IntoIterator<Item = V>) {
        let values: Vec<String> = values.into_iter().map(|v| v.to_string()).collect();
        *self.values_mut(key.into()) = values;
    }

    pub fn get(&self, key: &str) -> &[String] {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, values)| values.as_slice())
            .unwrap_or_default()
    }

    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key).first().map(String::as_str)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(key, values)| (key.as_str(), values.as_slice()))
    }

    /// Flatten into `(key, value)` pairs: keys in order, each followed by
    /// all of its values.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().flat_map(|(key, values)| {
            values
                .iter()
                .map(move |value| (key.as_str(), value.as_str()))
        })
    }

    fn values_mut(&mut self, key: String) -> &mut Vec<String> {
        let index = match self.entries.iter().position(|(k, _)| *k == key) {
            Some(index) => index,
            None => {
                self.entries.push((key, Vec::new()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[index].1
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        params.extend(iter);
        params
    }
}

impl<K: Into<String>, V: ToString> Extend<(K, V)> for Params {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.append(key, value);
        }
    }
}

/// A single `multipart/form-data` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormField {
    Text(String),
    /// Read from disk when the request is built. The part is named after the
    /// last path component and typed from its extension.
    File(PathBuf),
    /// In-memory file content. Typed `application/octet-stream` unless
    /// `content_type` says otherwise.
    Bytes {
        file_name: String,
        content_type: Option<String>,
        data: Vec<u8>,
    },
}

/// Payload attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// A JSON document sent verbatim.
    Json(String),
    /// `application/x-www-form-urlencoded` pairs.
    Form(Params),
    Multipart(Vec<(String, FormField)>),
}

impl RequestBody {
    pub fn kind(&self) -> &'static str {
        match self {
            RequestBody::Json(_) => "json",
            RequestBody::Form(_) => "form",
            RequestBody::Multipart(_) => "multipart",
        }
    }

    /// Media type announced for the body. Multipart bodies also carry a
    /// generated boundary parameter on the wire.
    pub fn content_type(&self) -> &'static str {
        match self {
            RequestBody::Json(_) => "application/json; charset=utf-8",
            RequestBody::Form(_) => "application/x-www-form-urlencoded",
            RequestBody::Multipart(_) => "multipart/form-data",
        }
    }
}

/// An HTTP request described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Headers,
    pub query: Params,
    pub body: Option<RequestBody>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            query: Params::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, url)
    }

    /// Append a header. Repeating a name adds another value.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers<K, V>(mut self, headers: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.append(key, value);
        self
    }

    pub fn query_values<V: ToString>(
        mut self,
        key: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let key = key.into();
        for value in values {
            self.query.append(key.clone(), value);
        }
        self
    }

    /// Attach a raw JSON document, replacing any previous body.
    pub fn json(mut self, json: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Json(json.into()));
        self
    }

    /// Serialize `value` and attach it as the JSON body.
    pub fn json_value<T: Serialize + ?Sized>(self, value: &T) -> Result<Self> {
        let json = serde_json::to_string(value)?;
        Ok(self.json(json))
    }

    /// Append a URL-encoded form field. A body of another kind is replaced.
    pub fn form(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        if let Some(RequestBody::Form(params)) = &mut self.body {
            params.append(key, value);
        } else {
            let mut params = Params::new();
            params.append(key, value);
            self.body = Some(RequestBody::Form(params));
        }
        self
    }

    pub fn multipart_text(self, name: impl Into<String>, value: impl ToString) -> Self {
        self.multipart_field(name, FormField::Text(value.to_string()))
    }

    pub fn multipart_file(self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.multipart_field(name, FormField::File(path.into()))
    }

    pub fn multipart_bytes(
        self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        self.multipart_field(
            name,
            FormField::Bytes {
                file_name: file_name.into(),
                content_type: None,
                data: data.into(),
            },
        )
    }

    /// Append a multipart field. A body of another kind is replaced.
    pub fn multipart_field(mut self, name: impl Into<String>, field: FormField) -> Self {
        let name = name.into();
        if let Some(RequestBody::Multipart(fields)) = &mut self.body {
            fields.push((name, field));
        } else {
            self.body = Some(RequestBody::Multipart(vec![(name, field)]));
        }
        self
    }
}

/// An HTTP response with its body already read into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// First value of header `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.headers
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    /// The body as UTF-8 text.
    pub fn text(&self) -> Result<String> {
        std::str::from_utf8(&self.body)
            .map(str::to_string)
            .map_err(|e| HttpError::Deserialization(e.to_string()))
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| HttpError::Deserialization(e.to_string()))
    }

    /// Turn a non-2xx response into `HttpError::Status`.
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        Err(HttpError::Status {
            status: self.status,
            body: String::from_utf8_lossy(&self.body).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                ("set-cookie".to_string(), "a=1".to_string()),
                ("Set-Cookie".to_string(), "b=2".to_string()),
            ],
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn method_parses_case_insensitively() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!("Delete".parse::<HttpMethod>().unwrap(), HttpMethod::Delete);
        assert!("PATCH".parse::<HttpMethod>().is_err());
        assert_eq!(HttpMethod::Put.to_string(), "PUT");
    }

    #[test]
    fn only_get_refuses_a_body() {
        assert!(!HttpMethod::Get.allows_body());
        assert!(HttpMethod::Post.allows_body());
        assert!(HttpMethod::Put.allows_body());
        assert!(HttpMethod::Delete.allows_body());
    }

    #[test]
    fn params_group_values_under_first_key_position() {
        let mut params = Params::new();
        params.append("name", "a");
        params.append("id", 1);
        params.append("name", "b");

        assert_eq!(params.len(), 2);
        assert_eq!(params.get("name"), ["a", "b"]);
        assert_eq!(params.first("id"), Some("1"));
        assert!(params.get("missing").is_empty());
        assert_eq!(
            params.pairs().collect::<Vec<_>>(),
            vec![("name", "a"), ("name", "b"), ("id", "1")]
        );
    }

    #[test]
    fn params_insert_replaces_in_place() {
        let mut params: Params = [("a", "1"), ("b", "2")].into_iter().collect();
        params.insert("a", ["x", "y"]);
        params.insert("c", Vec::<String>::new());

        assert_eq!(
            params.pairs().collect::<Vec<_>>(),
            vec![("a", "x"), ("a", "y"), ("b", "2")]
        );
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn request_builder_collects_parts() {
        let req = HttpRequest::get("http://localhost/items")
            .header("my-app-id", "easy-http")
            .header("my-app-id", "again")
            .query("id", 1)
            .query_values("tag", ["a", "b"]);

        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.url, "http://localhost/items");
        assert_eq!(req.headers.len(), 2);
        assert_eq!(req.query.get("tag"), ["a", "b"]);
        assert_eq!(req.query.first("id"), Some("1"));
        assert!(req.body.is_none());
    }

    #[test]
    fn json_value_serializes() {
        let req = HttpRequest::post("http://localhost/")
            .json_value(&serde_json::json!({"id": 1}))
            .unwrap();
        assert_eq!(req.body, Some(RequestBody::Json(r#"{"id":1}"#.to_string())));
    }

    #[test]
    fn form_fields_accumulate() {
        let req = HttpRequest::post("http://localhost/")
            .form("id", 1)
            .form("name", "test")
            .form("name", "test2");

        match req.body {
            Some(RequestBody::Form(params)) => {
                assert_eq!(params.get("name"), ["test", "test2"]);
                assert_eq!(params.first("id"), Some("1"));
            }
            other => panic!("expected form body, got {other:?}"),
        }
    }

    #[test]
    fn switching_body_kind_replaces_body() {
        let req = HttpRequest::post("http://localhost/")
            .json("{}")
            .form("a", 1)
            .multipart_text("b", 2);

        assert_eq!(
            req.body,
            Some(RequestBody::Multipart(vec![(
                "b".to_string(),
                FormField::Text("2".to_string())
            )]))
        );
    }

    #[test]
    fn multipart_fields_keep_order() {
        let req = HttpRequest::put("http://localhost/")
            .multipart_text("id", 1)
            .multipart_file("file", "/tmp/a.jpg")
            .multipart_bytes("file", "b.bin", vec![0u8, 1, 2]);

        let Some(RequestBody::Multipart(fields)) = req.body else {
            panic!("expected multipart body");
        };
        let names: Vec<_> = fields.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["id", "file", "file"]);
        assert_eq!(fields[1].1, FormField::File(PathBuf::from("/tmp/a.jpg")));
    }

    #[test]
    fn body_kind_and_content_type() {
        let json = RequestBody::Json(String::new());
        let form = RequestBody::Form(Params::new());
        let multipart = RequestBody::Multipart(Vec::new());
        assert_eq!(json.kind(), "json");
        assert_eq!(json.content_type(), "application/json; charset=utf-8");
        assert_eq!(form.content_type(), "application/x-www-form-urlencoded");
        assert_eq!(multipart.content_type(), "multipart/form-data");
    }

    #[test]
    fn response_header_lookup_ignores_case() {
        let resp = response(200, "{}");
        assert_eq!(resp.content_type(), Some("application/json"));
        assert_eq!(
            resp.header_values("SET-COOKIE").collect::<Vec<_>>(),
            vec!["a=1", "b=2"]
        );
        assert!(resp.header("x-missing").is_none());
    }

    #[test]
    fn response_status_classes() {
        assert!(response(204, "").is_success());
        assert!(response(404, "").is_client_error());
        assert!(response(503, "").is_server_error());
        assert!(!response(302, "").is_success());
    }

    #[test]
    fn response_body_decoding() {
        let resp = response(200, r#"{"id": 1, "name": "test"}"#);
        assert_eq!(resp.text().unwrap(), r#"{"id": 1, "name": "test"}"#);
        let value: serde_json::Value = resp.json().unwrap();
        assert_eq!(value["name"], "test");

        let bad = HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: vec![0xff, 0xfe],
        };
        assert!(matches!(bad.text(), Err(HttpError::Deserialization(_))));
        assert!(matches!(
            bad.json::<serde_json::Value>(),
            Err(HttpError::Deserialization(_))
        ));
    }

    #[test]
    fn error_for_status() {
        assert!(response(200, "ok").error_for_status().is_ok());
        let err = response(500, "boom").error_for_status().unwrap_err();
        assert!(matches!(err, HttpError::Status { status: 500, ref body } if body == "boom"));
    }
}
