use crate::error::{BrowserError, Result};
use std::sync::Arc;

/// A JSON response observed on the page's network traffic.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedResponse {
    /// Request URL
    pub url: String,
    /// HTTP status
    pub status: u16,
    /// Parsed JSON body
    pub body: serde_json::Value,
}

/// Receives captured responses.
///
/// Called from the listener task while the page is being driven, so
/// implementations must be safe to call concurrently with session actions.
pub trait ResponseSink: Send + Sync {
    /// Handle one captured response.
    fn on_response(&self, response: CapturedResponse);
}

/// A cookie installed into a session before navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
}

/// Per-session identity and session material.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// User agent override
    pub user_agent: Option<String>,
    /// Proxy server, `scheme://host:port` (credentials are not supported here)
    pub proxy_server: Option<String>,
    /// Window size
    pub viewport: Option<(u32, u32)>,
    /// Cookies set before the first navigation
    pub cookies: Vec<BrowserCookie>,
}

/// One driven page.
#[async_trait::async_trait]
pub trait PageSession: Send + Sync {
    /// Navigate to a URL and wait for the load event
    async fn goto(&self, url: &str) -> Result<()>;

    /// URL currently displayed, after any redirects
    async fn current_url(&self) -> Result<String>;

    /// Serialized DOM
    async fn content(&self) -> Result<String>;

    /// Click the first button or link whose text starts with one of `labels`.
    ///
    /// Returns the label that was clicked.
    async fn click_text(&self, labels: &[String]) -> Result<Option<String>>;

    /// Scroll the window down
    async fn scroll_by(&self, pixels: u32) -> Result<()>;

    /// Close the page and release the browser
    async fn close(&self) -> Result<()>;
}

/// Opens page sessions.
#[async_trait::async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Open a page session; every JSON response it receives goes to `sink`.
    async fn open(
        &self,
        options: SessionOptions,
        sink: Arc<dyn ResponseSink>,
    ) -> Result<Box<dyn PageSession>>;
}

/// Helper to extract domain from URL
pub fn extract_domain(url: &str) -> Result<String> {
    let url = url::Url::parse(url)
        .map_err(|e| BrowserError::NavigationError(format!("Invalid URL: {}", e)))?;

    url.host_str()
        .ok_or_else(|| BrowserError::NavigationError("No host in URL".to_string()))
        .map(|s| s.to_string())
}

/// Whether a response body should be handed to the sink.
pub(crate) fn is_json_mime(mime: &str) -> bool {
    let mime = mime.to_ascii_lowercase();
    mime.contains("json") || mime.contains("graphql")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            extract_domain("https://shop.example.com/menu").unwrap(),
            "shop.example.com"
        );
        assert_eq!(
            extract_domain("http://localhost:8080/path").unwrap(),
            "localhost"
        );
    }

    #[test]
    fn test_extract_domain_invalid() {
        assert!(extract_domain("not-a-url").is_err());
    }

    #[test]
    fn test_json_mime() {
        assert!(is_json_mime("application/json"));
        assert!(is_json_mime("application/graphql-response+json; charset=utf-8"));
        assert!(!is_json_mime("text/html"));
        assert!(!is_json_mime("image/png"));
    }
}
