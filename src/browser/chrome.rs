//! Chromium driver over the DevTools protocol

use crate::browser::driver::{BrowserDriver, BrowserPage, ElementInfo};
use crate::extractor::media::{self, MediaCandidate};
use crate::utils::config::BrowserSettings;
use crate::utils::error::{Result, StreamcastError};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::EventResponseReceived;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Captured media responses kept per page
const MAX_CAPTURED_MEDIA: usize = 64;

const QUERY_MEDIA_BODY: &str = r#"
    return { ok: all.map(function (el) {
        var nested = el.querySelector('source[src], iframe[src]');
        return {
            tag: el.tagName.toLowerCase(),
            src: el.getAttribute('src') || el.getAttribute('data-src'),
            nestedTag: nested ? nested.tagName.toLowerCase() : null,
            nestedSrc: nested ? nested.getAttribute('src') : null,
            classId: (el.getAttribute('class') || '') + ' ' + (el.id || '')
        };
    }) };
"#;

const PRESENT_BODY: &str = "return { ok: all.length > 0 };";

const CLICKABLE_BODY: &str = r#"
    var el = all[0];
    if (!el) { return { ok: false }; }
    var r = el.getBoundingClientRect();
    var s = window.getComputedStyle(el);
    return { ok: r.width > 0 && r.height > 0 && s.visibility !== 'hidden'
        && s.display !== 'none' && !el.disabled };
"#;

const ELEMENTS_BODY: &str = r#"
    return { ok: all.map(function (el) {
        return {
            tag: el.tagName.toLowerCase(),
            text: (el.innerText || '').trim().slice(0, 200),
            href: el.getAttribute('href'),
            src: el.getAttribute('src'),
            class: el.getAttribute('class'),
            id: el.id || null
        };
    }) };
"#;

/// Launches headless Chromium through chromiumoxide
pub struct ChromeDriver {
    settings: BrowserSettings,
}

impl ChromeDriver {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }

    fn config(&self) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(self.settings.window_width, self.settings.window_height)
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg(format!("--user-agent={}", self.settings.user_agent));
        if !self.settings.headless {
            builder = builder.with_head();
        }
        if let Some(exe) = &self.settings.executable {
            builder = builder.chrome_executable(exe);
        }
        builder.build().map_err(StreamcastError::Browser)
    }
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    fn id(&self) -> &'static str {
        "chromium"
    }

    async fn launch(&self) -> Result<Box<dyn BrowserPage>> {
        let (browser, mut handler) = Browser::launch(self.config()?)
            .await
            .map_err(cdp_error)?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("chromium handler event error: {}", e);
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(cdp_error(e));
            }
        };

        let media: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let listener = match page.event_listener::<EventResponseReceived>().await {
            Ok(mut events) => {
                let seen = media.clone();
                tokio::spawn(async move {
                    while let Some(event) = events.next().await {
                        let url = event.response.url.as_str();
                        if media::is_media_response(url, &event.response.mime_type) {
                            let mut seen = seen.lock().await;
                            if seen.len() < MAX_CAPTURED_MEDIA && !seen.iter().any(|u| u == url) {
                                debug!("Observed media response {}", url);
                                seen.push(url.to_string());
                            }
                        }
                    }
                })
            }
            Err(e) => {
                warn!("Network capture unavailable: {}", e);
                tokio::spawn(async {})
            }
        };

        info!("Chromium session started");
        Ok(Box::new(ChromePage {
            browser,
            page,
            handler,
            listener,
            media,
        }))
    }
}

pub struct ChromePage {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    listener: JoinHandle<()>,
    media: Arc<Mutex<Vec<String>>>,
}

#[derive(Deserialize)]
struct SelectorReply<T> {
    ok: Option<T>,
    invalid: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DomCandidate {
    tag: String,
    src: Option<String>,
    nested_tag: Option<String>,
    nested_src: Option<String>,
    class_id: String,
}

impl From<DomCandidate> for MediaCandidate {
    fn from(dom: DomCandidate) -> Self {
        let mut candidate = MediaCandidate::new(dom.tag).with_class_or_id(&dom.class_id);
        candidate.src = dom.src;
        if let (Some(tag), Some(src)) = (dom.nested_tag, dom.nested_src) {
            candidate = candidate.with_nested(tag, src);
        }
        candidate
    }
}

impl ChromePage {
    /// Run `body` with `all` bound to the matches of `selector`.
    async fn select<T: DeserializeOwned>(&mut self, selector: &str, body: &str) -> Result<T> {
        let quoted = serde_json::to_string(selector)?;
        let script = format!(
            "(function () {{ var all; try {{ all = Array.prototype.slice.call(document.querySelectorAll({})); }} catch (e) {{ return {{ invalid: String(e) }}; }} {} }})()",
            quoted, body
        );
        let reply: SelectorReply<T> = self
            .page
            .evaluate(script)
            .await
            .map_err(cdp_error)?
            .into_value()
            .map_err(|e| StreamcastError::Browser(format!("unexpected DOM reply: {}", e)))?;

        match (reply.ok, reply.invalid) {
            (_, Some(reason)) => Err(StreamcastError::InvalidSelector(format!(
                "{}: {}",
                selector, reason
            ))),
            (Some(value), None) => Ok(value),
            (None, None) => Err(StreamcastError::Browser(
                "empty DOM reply".to_string(),
            )),
        }
    }
}

#[async_trait]
impl BrowserPage for ChromePage {
    async fn goto(&mut self, url: &str) -> Result<()> {
        self.page.goto(url).await.map_err(cdp_error)?;
        Ok(())
    }

    async fn current_url(&mut self) -> Result<Option<String>> {
        self.page.url().await.map_err(cdp_error)
    }

    async fn query_media(&mut self, selector: &str) -> Result<Vec<MediaCandidate>> {
        let found: Vec<DomCandidate> = self.select(selector, QUERY_MEDIA_BODY).await?;
        Ok(found.into_iter().map(MediaCandidate::from).collect())
    }

    async fn is_present(&mut self, selector: &str) -> Result<bool> {
        self.select(selector, PRESENT_BODY).await
    }

    async fn click(&mut self, selector: &str) -> Result<bool> {
        let clickable: bool = self.select(selector, CLICKABLE_BODY).await?;
        if !clickable {
            return Ok(false);
        }
        // A covered or detaching element fails here; the caller retries.
        match self.page.find_element(selector).await {
            Ok(element) => Ok(element.click().await.is_ok()),
            Err(e) => {
                debug!("Element {} vanished before click: {}", selector, e);
                Ok(false)
            }
        }
    }

    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value> {
        let result = self.page.evaluate(script).await.map_err(cdp_error)?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn content(&mut self) -> Result<String> {
        self.page.content().await.map_err(cdp_error)
    }

    async fn elements(&mut self, selector: &str) -> Result<Vec<ElementInfo>> {
        self.select(selector, ELEMENTS_BODY).await
    }

    async fn media_requests(&mut self) -> Vec<String> {
        self.media.lock().await.clone()
    }

    async fn clear_media_requests(&mut self) {
        self.media.lock().await.clear();
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>> {
        self.page
            .screenshot(ScreenshotParams::builder().build())
            .await
            .map_err(cdp_error)
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        self.listener.abort();
        let closed = self.browser.close().await.map_err(cdp_error);
        if let Err(e) = self.browser.wait().await {
            debug!("Waiting for chromium to exit failed: {}", e);
        }
        self.handler.abort();
        closed.map(|_| ())
    }
}

fn cdp_error(e: CdpError) -> StreamcastError {
    if matches!(e, CdpError::JavascriptException(_)) {
        StreamcastError::Script(e.to_string())
    } else {
        StreamcastError::Browser(e.to_string())
    }
}
