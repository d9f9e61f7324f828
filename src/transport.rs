//! The network boundary. Every remote call the crate makes is a GET through
//! a [`Transport`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::{CensusError, Result, format_http_failure, looks_like_invalid_key};
use crate::util::redact_key;

/// Implementations must be `Send` so a session can move between threads.
pub trait Transport: Send {
    /// Fetches `url` and returns the body verbatim.
    fn get_text(&self, url: &str) -> Result<String>;

    /// Fetches `url` and parses the body as JSON.
    fn get_json(&self, url: &str) -> Result<Value> {
        let text = self.get_text(url)?;
        serde_json::from_str(&text)
            .map_err(|e| CensusError::transport(url, format!("malformed JSON body: {}", e)))
    }
}

/// Fetches `url` and deserializes it into `T`; shape mismatches are transport errors.
pub(crate) fn fetch<T: DeserializeOwned>(transport: &dyn Transport, url: &str) -> Result<T> {
    let value = transport.get_json(url)?;
    serde_json::from_value(value)
        .map_err(|e| CensusError::transport(url, format!("unexpected document shape: {}", e)))
}

/// Blocking HTTP transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: HttpClient,
}

impl HttpTransport {
    pub fn new(verify: bool, timeout: Duration) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("censusapi-rs/{}", env!("CARGO_PKG_VERSION")))
                .unwrap_or(HeaderValue::from_static("censusapi-rs")),
        );

        let mut builder = HttpClient::builder()
            .default_headers(default_headers)
            .timeout(timeout);

        if !verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder.build().map_err(|e| CensusError::Transport {
            url: String::new(),
            reason: format!("failed to build HTTP client: {}", e),
        })?;
        Ok(Self { http })
    }
}

impl Transport for HttpTransport {
    fn get_text(&self, url: &str) -> Result<String> {
        debug!(url = %redact_key(url), "GET");
        let resp = self
            .http
            .get(url)
            .send()
            .map_err(|e| CensusError::transport(url, format!("could not connect: {}", e)))?;

        let status = resp.status();
        let text = resp
            .text()
            .map_err(|e| CensusError::transport(url, format!("failed to read body: {}", e)))?;

        if !status.is_success() || status == StatusCode::NO_CONTENT || looks_like_invalid_key(&text)
        {
            return Err(format_http_failure(status, url, &text));
        }
        Ok(text)
    }
}

/// In-memory transport serving canned bodies keyed by exact URL.
///
/// Clones share the request log, so a test can keep one handle and give
/// another to the session.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    responses: Arc<Mutex<HashMap<String, String>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

// A panic while holding the lock leaves plain data behind; keep using it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.insert(url, body);
        self
    }

    pub fn with_json(self, url: impl Into<String>, body: &Value) -> Self {
        self.insert(url, body.to_string());
        self
    }

    pub fn insert(&self, url: impl Into<String>, body: impl Into<String>) {
        lock(&self.responses).insert(url.into(), body.into());
    }

    /// Every URL requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        lock(&self.requests).iter().filter(|u| *u == url).count()
    }
}

impl Transport for MockTransport {
    fn get_text(&self, url: &str) -> Result<String> {
        lock(&self.requests).push(url.to_string());
        match lock(&self.responses).get(url) {
            Some(body) => Ok(body.clone()),
            None => Err(format_http_failure(StatusCode::NOT_FOUND, url, "")),
        }
    }
}
