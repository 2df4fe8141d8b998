//! Shared mock transport for the integration tests.

use async_trait::async_trait;
use http::{HeaderMap, StatusCode};
use scrapekit::{Request, Response, ScrapeError, Session};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// One scripted answer for a URL.
pub struct Scripted {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: &'static [u8],
}

impl Scripted {
    pub fn status(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: b"",
        }
    }

    pub fn ok_json(body: &'static [u8]) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body,
        }
    }

    pub fn with_header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.insert(
            http::header::HeaderName::from_static(name),
            http::header::HeaderValue::from_static(value),
        );
        self
    }
}

/// A transport that answers from per-URL scripts and records every call
/// with its timestamp. URLs without a script (or with an exhausted one)
/// get a plain 200.
pub struct MockSession {
    scripts: Mutex<HashMap<String, Vec<Scripted>>>,
    calls: Mutex<Vec<(String, Instant)>>,
    latency: Duration,
}

impl MockSession {
    pub fn new() -> Arc<Self> {
        Self::with_latency(Duration::ZERO)
    }

    pub fn with_latency(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            latency,
        })
    }

    pub fn script(self: Arc<Self>, url: &str, responses: Vec<Scripted>) -> Arc<Self> {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), responses);
        self
    }

    pub fn calls(&self) -> Vec<(String, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, url: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == url)
            .map(|(_, t)| *t)
            .collect()
    }
}

#[async_trait]
impl Session for MockSession {
    async fn perform(&self, request: &Request) -> Result<Response, ScrapeError> {
        self.calls
            .lock()
            .unwrap()
            .push((request.url.clone(), Instant::now()));
        if self.latency > Duration::ZERO {
            tokio::time::sleep(self.latency).await;
        }

        let scripted = {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(&request.url) {
                Some(responses) if !responses.is_empty() => Some(responses.remove(0)),
                _ => None,
            }
        };
        let scripted = scripted.unwrap_or_else(|| Scripted::ok_json(b"{}"));

        Ok(Response {
            url: request.url.clone(),
            method: request.method.clone(),
            status: scripted.status,
            headers: scripted.headers,
            cookies: Vec::new(),
            body: bytes::Bytes::from_static(scripted.body),
        })
    }
}
