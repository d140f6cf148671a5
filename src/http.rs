// Transport-agnostic HTTP request/response values and the two transport
// seams (blocking and async) the sessions send them through.
//
// Everything that decides *what* goes on the wire builds an [`HttpRequest`];
// only the [`Transport`] / [`AsyncTransport`] implementations know *how* it
// gets there. The reqwest implementations live at the bottom of this file.

use crate::error::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Request body.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Json(Value),
    Multipart(MultipartForm),
}

/// A multipart form: plain text fields plus exactly one binary part.
#[derive(Debug, Clone, PartialEq)]
pub struct MultipartForm {
    pub fields: Vec<(String, String)>,
    pub file: FilePart,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    /// Form field name, always `file` for the storage service.
    pub name: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// A fully described outbound request. `bearer` is filled in by the session
/// right before sending, never by the request builders.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub bearer: Option<String>,
    pub body: Body,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            bearer: None,
            body: Body::Empty,
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Body::Json(body);
        self
    }

    pub fn multipart(mut self, form: MultipartForm) -> Self {
        self.body = Body::Multipart(form);
        self
    }

    /// Value of the first query parameter named `key`.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Status and raw body of a response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Blocking transport: one thread per call.
pub trait Transport: Send + Sync {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// Non-blocking transport. Suspends only while the request is in flight.
#[async_trait]
pub trait AsyncTransport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

impl Transport for reqwest::blocking::Client {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        use reqwest::blocking::multipart;

        debug!(method = ?request.method, url = %request.url, "sending request");
        let mut builder = self
            .request(request.method.into(), &request.url)
            .query(&request.query);
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        builder = match &request.body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(value),
            Body::Multipart(form) => {
                let mut part = multipart::Part::bytes(form.file.bytes.clone())
                    .file_name(form.file.filename.clone());
                if let Some(content_type) = &form.file.content_type {
                    part = part.mime_str(content_type)?;
                }
                let mut out = multipart::Form::new();
                for (key, value) in &form.fields {
                    out = out.text(key.clone(), value.clone());
                }
                builder.multipart(out.part(form.file.name.clone(), part))
            }
        };

        let response = builder.send()?;
        let status = response.status().as_u16();
        let body = response.bytes()?.to_vec();
        Ok(HttpResponse { status, body })
    }
}

#[async_trait]
impl AsyncTransport for reqwest::Client {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        use reqwest::multipart;

        debug!(method = ?request.method, url = %request.url, "sending request");
        let mut builder = self
            .request(request.method.into(), &request.url)
            .query(&request.query);
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        builder = match &request.body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(value),
            Body::Multipart(form) => {
                let mut part = multipart::Part::bytes(form.file.bytes.clone())
                    .file_name(form.file.filename.clone());
                if let Some(content_type) = &form.file.content_type {
                    part = part.mime_str(content_type)?;
                }
                let mut out = multipart::Form::new();
                for (key, value) in &form.fields {
                    out = out.text(key.clone(), value.clone());
                }
                builder.multipart(out.part(form.file.name.clone(), part))
            }
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(HttpResponse { status, body })
    }
}
