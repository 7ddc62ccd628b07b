use crate::actions::{
    is_json_mime, BrowserCookie, BrowserDriver, CapturedResponse, PageSession, ResponseSink,
    SessionOptions,
};
use crate::error::{BrowserError, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, EventLoadingFinished, EventResponseReceived, GetResponseBodyParams, RequestId,
};
use chromiumoxide::Page;
use futures_util::stream::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Launches one Chromium per session so each identity gets its own proxy
/// and user agent.
#[derive(Debug, Clone)]
pub struct ChromiumDriver {
    headless: bool,
    navigation_timeout: Duration,
}

impl ChromiumDriver {
    pub fn new(headless: bool, navigation_timeout: Duration) -> Self {
        Self {
            headless,
            navigation_timeout,
        }
    }

    fn launch_config(&self, options: &SessionOptions) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .request_timeout(self.navigation_timeout);

        if !self.headless {
            builder = builder.with_head();
        }
        if let Some((width, height)) = options.viewport {
            builder = builder.window_size(width, height);
        }
        if let Some(user_agent) = &options.user_agent {
            builder = builder.arg(format!("--user-agent={user_agent}"));
        }
        if let Some(proxy) = &options.proxy_server {
            builder = builder.arg(format!("--proxy-server={proxy}"));
        }

        builder.build().map_err(BrowserError::ChromiumError)
    }
}

#[async_trait::async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn open(
        &self,
        options: SessionOptions,
        sink: Arc<dyn ResponseSink>,
    ) -> Result<Box<dyn PageSession>> {
        let config = self.launch_config(&options)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        // Spawn browser handler
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    trace!("browser handler event error: {}", e);
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(BrowserError::ChromiumError(e.to_string()));
            }
        };

        let mut session = ChromiumSession {
            browser: Mutex::new(browser),
            page,
            navigation_timeout: self.navigation_timeout,
            tasks: vec![handler_task],
        };

        if let Err(e) = session.install(&options.cookies, sink).await {
            let _ = session.close().await;
            return Err(e);
        }

        debug!(
            proxied = options.proxy_server.is_some(),
            cookies = options.cookies.len(),
            "opened browser session"
        );
        Ok(Box::new(session))
    }
}

/// A single page in a dedicated browser process.
pub struct ChromiumSession {
    browser: Mutex<Browser>,
    page: Page,
    navigation_timeout: Duration,
    tasks: Vec<JoinHandle<()>>,
}

impl ChromiumSession {
    async fn install(
        &mut self,
        cookies: &[BrowserCookie],
        sink: Arc<dyn ResponseSink>,
    ) -> Result<()> {
        if !cookies.is_empty() {
            let params = cookies
                .iter()
                .map(cookie_param)
                .collect::<Result<Vec<_>>>()?;
            self.page
                .set_cookies(params)
                .await
                .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        }

        let listener = spawn_response_listener(self.page.clone(), sink).await?;
        self.tasks.push(listener);
        Ok(())
    }
}

fn cookie_param(cookie: &BrowserCookie) -> Result<CookieParam> {
    CookieParam::builder()
        .name(cookie.name.clone())
        .value(cookie.value.clone())
        .domain(cookie.domain.clone())
        .path(cookie.path.clone())
        .build()
        .map_err(BrowserError::ChromiumError)
}

/// Forward every JSON response body the page receives to `sink`.
///
/// Bodies are only complete once loading has finished, so response metadata
/// is held until the matching loading-finished event arrives.
async fn spawn_response_listener(
    page: Page,
    sink: Arc<dyn ResponseSink>,
) -> Result<JoinHandle<()>> {
    let mut responses = page
        .event_listener::<EventResponseReceived>()
        .await
        .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
    let mut finished = page
        .event_listener::<EventLoadingFinished>()
        .await
        .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

    Ok(tokio::spawn(async move {
        let mut pending: HashMap<String, (RequestId, String, u16)> = HashMap::new();
        loop {
            tokio::select! {
                Some(event) = responses.next() => {
                    if is_json_mime(&event.response.mime_type) {
                        let status = u16::try_from(event.response.status).unwrap_or(0);
                        pending.insert(
                            event.request_id.as_ref().to_string(),
                            (event.request_id.clone(), event.response.url.clone(), status),
                        );
                    }
                }
                Some(event) = finished.next() => {
                    let Some((request_id, url, status)) =
                        pending.remove(event.request_id.as_ref())
                    else {
                        continue;
                    };
                    match page.execute(GetResponseBodyParams::new(request_id)).await {
                        Ok(response) if !response.result.base64_encoded => {
                            match serde_json::from_str(&response.result.body) {
                                Ok(body) => sink.on_response(CapturedResponse { url, status, body }),
                                Err(e) => trace!(url = %url, "non-JSON body: {}", e),
                            }
                        }
                        Ok(_) => trace!(url = %url, "skipping binary body"),
                        Err(e) => debug!(url = %url, "response body unavailable: {}", e),
                    }
                }
                else => break,
            }
        }
    }))
}

#[async_trait::async_trait]
impl PageSession for ChromiumSession {
    async fn goto(&self, url: &str) -> Result<()> {
        match tokio::time::timeout(self.navigation_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(BrowserError::NavigationError(format!("{url}: {e}"))),
            Err(_) => Err(BrowserError::Timeout(format!(
                "navigation to {url} exceeded {}s",
                self.navigation_timeout.as_secs()
            ))),
        }
    }

    async fn current_url(&self) -> Result<String> {
        self.page
            .url()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))
            .map(Option::unwrap_or_default)
    }

    async fn content(&self) -> Result<String> {
        self.page
            .content()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))
    }

    async fn click_text(&self, labels: &[String]) -> Result<Option<String>> {
        let labels = serde_json::to_string(labels)
            .map_err(|e| BrowserError::ScriptError(e.to_string()))?;
        let script = format!(
            r#"(() => {{
                const labels = {labels};
                const candidates = Array.from(document.querySelectorAll(
                    'button, a, [role="button"], input[type="submit"], input[type="button"]'
                ));
                for (const label of labels) {{
                    const wanted = label.toLowerCase();
                    const hit = candidates.find(el => {{
                        const text = (el.innerText || el.value || '').trim().toLowerCase();
                        return text.startsWith(wanted);
                    }});
                    if (hit) {{ hit.click(); return label; }}
                }}
                return null;
            }})()"#
        );

        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::ScriptError(e.to_string()))?;
        Ok(result
            .value()
            .and_then(serde_json::Value::as_str)
            .map(String::from))
    }

    async fn scroll_by(&self, pixels: u32) -> Result<()> {
        self.page
            .evaluate(format!("window.scrollBy(0, {pixels})"))
            .await
            .map(|_| ())
            .map_err(|e| BrowserError::ScriptError(e.to_string()))
    }

    async fn close(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            warn!("browser close failed: {}", e);
        }
        let _ = browser.wait().await;
        for task in &self.tasks {
            task.abort();
        }
        Ok(())
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
