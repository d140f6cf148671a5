#![allow(dead_code)]

// In-process stand-in for the identity and storage services. Every request
// is recorded so tests can assert on exactly what went over the wire.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use ufiles::http::{AsyncTransport, HttpRequest, HttpResponse, Transport};
use ufiles::{Config, Result};
use uuid::Uuid;

pub const STORAGE_URL: &str = "https://media.example.io/v1/f";
pub const IDENTITY_URL: &str = "https://sso.example.io";

type Handler = dyn Fn(&HttpRequest) -> HttpResponse + Send + Sync;

#[derive(Clone)]
pub struct FakeServer {
    log: Arc<Mutex<Vec<HttpRequest>>>,
    handler: Arc<Handler>,
}

impl FakeServer {
    /// `handler` sees every request, identity ones included.
    pub fn new(handler: impl Fn(&HttpRequest) -> HttpResponse + Send + Sync + 'static) -> Self {
        FakeServer {
            log: Arc::new(Mutex::new(Vec::new())),
            handler: Arc::new(handler),
        }
    }

    /// Identity requests get `tok-1`, `tok-2`, ... in order; everything else
    /// goes to `storage`.
    pub fn with_tokens(
        storage: impl Fn(&HttpRequest) -> HttpResponse + Send + Sync + 'static,
    ) -> Self {
        let issued = AtomicUsize::new(0);
        Self::new(move |req| {
            if is_identity(req) {
                let n = issued.fetch_add(1, Ordering::SeqCst) + 1;
                token_response(&format!("tok-{n}"))
            } else {
                storage(req)
            }
        })
    }

    fn handle(&self, request: &HttpRequest) -> HttpResponse {
        self.log.lock().unwrap().push(request.clone());
        (self.handler)(request)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.log.lock().unwrap().clone()
    }

    pub fn storage_requests(&self) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| !is_identity(r))
            .collect()
    }

    pub fn token_requests(&self) -> usize {
        self.requests().iter().filter(|r| is_identity(r)).count()
    }
}

impl Transport for FakeServer {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        Ok(self.handle(request))
    }
}

#[async_trait]
impl AsyncTransport for FakeServer {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        Ok(self.handle(request))
    }
}

pub fn is_identity(request: &HttpRequest) -> bool {
    request.url.starts_with(IDENTITY_URL)
}

pub fn config() -> Config {
    Config::new(STORAGE_URL).refresh_token("refresh-1")
}

pub fn token_response(token: &str) -> HttpResponse {
    HttpResponse::new(200, json!({ "access_token": token }).to_string())
}

pub fn item_json(filename: &str) -> Value {
    json!({
        "uid": Uuid::new_v4(),
        "user_id": "0b4f0d0e-52c3-4a44-8e5e-7e3a0c1f9b22",
        "business_name": "pixiee",
        "filename": filename,
        "content_type": "text/plain",
        "size": 5,
        "created_at": "2024-05-01T10:00:00",
        "updated_at": "2024-05-01T10:00:00"
    })
}

pub fn item_response(filename: &str) -> HttpResponse {
    HttpResponse::new(200, item_json(filename).to_string())
}

pub fn page_response(len: usize) -> HttpResponse {
    let items: Vec<Value> = (0..len).map(|i| item_json(&format!("f{i}"))).collect();
    HttpResponse::new(200, json!({ "items": items }).to_string())
}

/// Serves a listing whose pages have the given sizes, keyed by request order.
pub fn paged_listing(sizes: Vec<usize>) -> impl Fn(&HttpRequest) -> HttpResponse + Send + Sync {
    let calls = AtomicUsize::new(0);
    move |_req: &HttpRequest| {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        page_response(sizes.get(n).copied().unwrap_or(0))
    }
}

pub fn offsets(requests: &[HttpRequest]) -> Vec<String> {
    requests
        .iter()
        .map(|r| r.query_value("offset").unwrap_or_default().to_string())
        .collect()
}
