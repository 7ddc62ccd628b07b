//! HTTP transport seam and response classification.

use crate::controller::Identity;
use crate::error::TransportFailure;
use async_trait::async_trait;
use canopy_core::AdapterOutcome;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
}

/// An outbound request, independent of the HTTP client.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Method
    pub method: Method,
    /// Absolute URL without query string
    pub url: String,
    /// Query parameters
    pub query: Vec<(String, String)>,
    /// Extra headers
    pub headers: Vec<(String, String)>,
    /// JSON body
    pub json: Option<Value>,
}

impl HttpRequest {
    /// GET request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            json: None,
        }
    }

    /// POST request with a JSON body.
    #[must_use]
    pub fn post_json(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            json: Some(body),
        }
    }

    /// Add a query parameter.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Add a header.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Value of a query parameter, if set.
    #[must_use]
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A received response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status
    pub status: u16,
    /// Body text
    pub body: String,
}

impl HttpResponse {
    /// Response with a JSON body.
    #[must_use]
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }

    /// Response with a text body.
    #[must_use]
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Sends requests under an outbound identity.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request. Non-2xx statuses are responses, not failures.
    async fn send(
        &self,
        request: HttpRequest,
        identity: &Identity,
    ) -> Result<HttpResponse, TransportFailure>;
}

/// [`Transport`] backed by reqwest, with one client per proxy session.
#[derive(Debug)]
pub struct ReqwestTransport {
    timeout: Duration,
    clients: Mutex<HashMap<Option<String>, Client>>,
}

impl ReqwestTransport {
    /// Create a transport with a per-request timeout.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn client_for(&self, identity: &Identity) -> Result<Client, TransportFailure> {
        let proxy_url = identity.proxy.as_ref().map(crate::ProxyEndpoint::url);
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(&proxy_url) {
            return Ok(client.clone());
        }

        let mut builder = Client::builder().timeout(self.timeout);
        if let Some(url) = &proxy_url {
            let proxy = reqwest::Proxy::all(url)
                .map_err(|e| TransportFailure::Proxy(format!("invalid proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| TransportFailure::InvalidRequest(format!("failed to create HTTP client: {e}")))?;

        clients.insert(proxy_url, client.clone());
        Ok(client)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: HttpRequest,
        identity: &Identity,
    ) -> Result<HttpResponse, TransportFailure> {
        let client = self.client_for(identity)?;

        let mut builder = match request.method {
            Method::Get => client.get(&request.url),
            Method::Post => client.post(&request.url),
        };
        builder = builder
            .header("user-agent", &identity.fingerprint.user_agent)
            .header("accept-language", &identity.fingerprint.accept_language);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = &request.json {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_reqwest_error)?;

        debug!(url = %request.url, status, bytes = body.len(), "received response");
        Ok(HttpResponse { status, body })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportFailure {
    let message = err.to_string();
    if err.is_timeout() {
        TransportFailure::Timeout(message)
    } else if err.is_connect() {
        if message.to_ascii_lowercase().contains("proxy") {
            TransportFailure::Proxy(message)
        } else {
            TransportFailure::Connect(message)
        }
    } else if err.is_builder() {
        TransportFailure::InvalidRequest(message)
    } else {
        TransportFailure::Request(message)
    }
}

/// Markers only an anti-bot interstitial page carries, lowercase.
const INTERSTITIAL_MARKERS: &[(&str, &str)] = &[
    ("<title>just a moment...</title>", "cloudflare challenge"),
    ("attention required! | cloudflare", "cloudflare block"),
    ("cf-chl-", "cloudflare challenge"),
    ("id=\"px-captcha\"", "perimeterx captcha"),
    ("<title>access denied</title>", "access denied"),
];

/// Anti-bot tooling that ordinary pages also embed (form widgets, injected
/// scripts). Only meaningful when nothing usable was parsed from the body.
const WIDGET_MARKERS: &[(&str, &str)] = &[
    ("challenge-platform", "cloudflare challenge"),
    ("px-captcha", "perimeterx captcha"),
    ("g-recaptcha", "captcha"),
    ("h-captcha", "captcha"),
    ("datadome", "datadome challenge"),
];

fn find_marker(lower: &str, markers: &[(&str, &'static str)]) -> Option<&'static str> {
    markers
        .iter()
        .find(|(marker, _)| lower.contains(marker))
        .map(|(_, name)| *name)
}

/// Name of the interstitial a body is, if it is one.
#[must_use]
pub fn detect_interstitial(body: &str) -> Option<&'static str> {
    find_marker(&body.to_ascii_lowercase(), INTERSTITIAL_MARKERS)
}

/// Name of the anti-bot challenge a body contains, if any.
///
/// Broader than [`detect_interstitial`]: also matches captcha widgets and
/// challenge scripts, so use it only for bodies that yielded no content.
#[must_use]
pub fn detect_challenge(body: &str) -> Option<&'static str> {
    let lower = body.to_ascii_lowercase();
    find_marker(&lower, INTERSTITIAL_MARKERS).or_else(|| find_marker(&lower, WIDGET_MARKERS))
}

/// Classify a received response.
///
/// Returns `None` for a usable 2xx response; otherwise the outcome it
/// represents.
#[must_use]
pub fn classify_response(response: &HttpResponse, has_session: bool) -> Option<AdapterOutcome> {
    let status = response.status;
    match status {
        200..=299 => detect_interstitial(&response.body).map(|name| {
            AdapterOutcome::BlockedOrChallenged {
                reason: name.to_string(),
            }
        }),
        401 | 419 if has_session => Some(AdapterOutcome::AuthExpired {
            reason: format!("HTTP {status}: session rejected"),
        }),
        403 | 429 | 503 => Some(AdapterOutcome::BlockedOrChallenged {
            reason: match detect_challenge(&response.body) {
                Some(name) => format!("HTTP {status}: {name}"),
                None => format!("HTTP {status}"),
            },
        }),
        407 => Some(AdapterOutcome::TransportError {
            reason: "HTTP 407: proxy authentication required".to_string(),
            likely_blocking: true,
        }),
        _ => Some(AdapterOutcome::TransportError {
            reason: format!("HTTP {status}"),
            likely_blocking: false,
        }),
    }
}

/// Outcome for a request that failed before a response.
#[must_use]
pub fn classify_failure(failure: &TransportFailure) -> AdapterOutcome {
    AdapterOutcome::TransportError {
        reason: failure.to_string(),
        likely_blocking: failure.likely_blocking(),
    }
}
