//! Browser session ownership and page-level primitives
//!
//! The controller is the only owner of the headless browser. Every operation
//! is bounded by a timeout, and any failure that leaves the browser unusable
//! tears the session down before the error is returned, so a dead process is
//! never left behind.

use crate::browser::driver::{BrowserDriver, BrowserPage, ElementInfo, ScrollDirection};
use crate::extractor::media;
use crate::extractor::models::{ExtractionResult, Strategy};
use crate::utils::config::TimeoutSettings;
use crate::utils::error::{Result, StreamcastError};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{error::Elapsed, timeout, Instant};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// A live browser process and what it currently shows.
pub struct BrowserSession {
    page: Box<dyn BrowserPage>,
    current_url: Option<String>,
    id: Uuid,
    started_at: DateTime<Utc>,
}

impl BrowserSession {
    pub fn current_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

pub struct BrowserController {
    driver: Arc<dyn BrowserDriver>,
    session: Option<BrowserSession>,
    timeouts: TimeoutSettings,
}

impl BrowserController {
    pub fn new(driver: Arc<dyn BrowserDriver>, timeouts: TimeoutSettings) -> Self {
        Self {
            driver,
            session: None,
            timeouts,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&BrowserSession> {
        self.session.as_ref()
    }

    pub fn current_url(&self) -> Option<&str> {
        self.session.as_ref().and_then(|s| s.current_url())
    }

    pub fn timeouts(&self) -> &TimeoutSettings {
        &self.timeouts
    }

    /// Start a browser unless one is already running.
    pub async fn ensure_session(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }

        let limit = self.timeouts.page_load();
        debug!("Launching browser via {}", self.driver.id());
        let page = match timeout(limit, self.driver.launch()).await {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => {
                warn!("Browser launch failed: {}", e);
                return Err(e);
            }
            Err(_) => return Err(StreamcastError::timeout("browser launch", limit)),
        };

        let session = BrowserSession {
            page,
            current_url: None,
            id: Uuid::new_v4(),
            started_at: Utc::now(),
        };
        info!("Browser session {} started", session.id);
        self.session = Some(session);
        Ok(())
    }

    /// Load `url`, waiting for the document to be ready.
    pub async fn navigate(&mut self, url: &str) -> Result<()> {
        self.ensure_session().await?;
        let limit = self.timeouts.page_load();

        // Responses captured for the previous page must not leak into this one.
        self.page()?.clear_media_requests().await;
        let outcome = timeout(limit, self.page()?.goto(url)).await;
        self.settle(outcome, &format!("load {}", url), limit).await?;

        let outcome = timeout(limit, self.page()?.current_url()).await;
        let landed = self.settle(outcome, "read current URL", limit).await?;
        if let Some(session) = self.session.as_mut() {
            session.current_url = Some(landed.unwrap_or_else(|| url.to_string()));
        }
        info!("Navigated to: {}", url);
        Ok(())
    }

    /// Try each popup selector once after letting scripted overlays appear.
    ///
    /// Returns how many popups were closed. Missing, hidden or slow elements
    /// are skipped; only a dead browser is an error.
    pub async fn dismiss_popups(&mut self, popup_selectors: &[String]) -> Result<usize> {
        if popup_selectors.is_empty() {
            return Ok(0);
        }
        self.page()?;

        tokio::time::sleep(self.timeouts.popup_settle()).await;

        let limit = self.timeouts.popup_click();
        let mut dismissed = 0;
        for selector in popup_selectors {
            let outcome = timeout(limit, self.page()?.click(selector)).await;
            match self.settle(outcome, &format!("close popup {}", selector), limit).await {
                Ok(true) => {
                    debug!("Closed popup with selector: {}", selector);
                    dismissed += 1;
                }
                Ok(false) => {}
                Err(e) if e.is_fatal_browser() => return Err(e),
                Err(e) => debug!("Popup selector {} skipped: {}", selector, e),
            }
        }

        if dismissed > 0 {
            info!("Dismissed {} popup(s)", dismissed);
        }
        Ok(dismissed)
    }

    /// Wait up to `wait` for `selector` to become clickable, then click it.
    pub async fn click(&mut self, selector: &str, wait: Duration) -> Result<()> {
        self.ensure_session().await?;
        let deadline = Instant::now() + wait;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let outcome = timeout(remaining.max(POLL_INTERVAL), self.page()?.click(selector)).await;
            match self.settle(outcome, &format!("click {}", selector), wait).await {
                Ok(true) => {
                    info!("Clicked element: {}", selector);
                    return Ok(());
                }
                Ok(false) => {}
                Err(StreamcastError::Timeout { .. }) => {}
                Err(e) => return Err(e),
            }
            if Instant::now() + POLL_INTERVAL > deadline {
                return Err(StreamcastError::timeout(format!("click {}", selector), wait));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    pub async fn scroll(&mut self, direction: ScrollDirection) -> Result<()> {
        self.execute_script(&direction.script()).await?;
        info!("Scrolled page: {}", direction.as_str());
        Ok(())
    }

    /// Suspend until `selector` is present or `wait` elapses.
    pub async fn wait_for(&mut self, selector: &str, wait: Duration) -> Result<()> {
        self.ensure_session().await?;
        let deadline = Instant::now() + wait;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let outcome = timeout(remaining.max(POLL_INTERVAL), self.page()?.is_present(selector)).await;
            match self.settle(outcome, &format!("wait for {}", selector), wait).await {
                Ok(true) => {
                    debug!("Element found: {}", selector);
                    return Ok(());
                }
                Ok(false) | Err(StreamcastError::Timeout { .. }) => {}
                Err(e) => return Err(e),
            }
            if Instant::now() + POLL_INTERVAL > deadline {
                return Err(StreamcastError::timeout(format!("wait for {}", selector), wait));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Run `code` in the page and return its value.
    ///
    /// Scripts written as function bodies (`return document.title`) are
    /// wrapped so both styles work.
    pub async fn execute_script(&mut self, code: &str) -> Result<serde_json::Value> {
        self.ensure_session().await?;
        let script = wrap_function_body(code);
        let limit = self.timeouts.page_load();
        let outcome = timeout(limit, self.page()?.evaluate(&script)).await;
        self.settle(outcome, "execute script", limit).await
    }

    pub async fn get_page_source(&mut self) -> Result<String> {
        self.ensure_session().await?;
        let limit = self.timeouts.page_load();
        let outcome = timeout(limit, self.page()?.content()).await;
        self.settle(outcome, "read page source", limit).await
    }

    /// Live URL of the page, refreshed from the browser when one is running.
    pub async fn get_current_url(&mut self) -> Result<Option<String>> {
        if self.session.is_none() {
            return Ok(None);
        }
        let limit = self.timeouts.element_wait();
        let outcome = timeout(limit, self.page()?.current_url()).await;
        let url = self.settle(outcome, "read current URL", limit).await?;
        if let (Some(session), Some(url)) = (self.session.as_mut(), url.as_ref()) {
            session.current_url = Some(url.clone());
        }
        Ok(url.or_else(|| self.current_url().map(str::to_string)))
    }

    pub async fn get_elements(&mut self, selector: &str) -> Result<Vec<ElementInfo>> {
        self.ensure_session().await?;
        let limit = self.timeouts.element_wait();
        let outcome = timeout(limit, self.page()?.elements(selector)).await;
        let found = self.settle(outcome, &format!("list {}", selector), limit).await?;
        info!("Found {} elements matching: {}", found.len(), selector);
        Ok(found)
    }

    /// Save a PNG of the current viewport to `path`.
    pub async fn take_screenshot(&mut self, path: &Path) -> Result<()> {
        self.ensure_session().await?;
        let limit = self.timeouts.page_load();
        let outcome = timeout(limit, self.page()?.screenshot()).await;
        let png = self.settle(outcome, "take screenshot", limit).await?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, &png).await?;
        info!("Screenshot saved to {}", path.display());
        Ok(())
    }

    /// Find media in the rendered page.
    ///
    /// Order: `video_selectors` against the live DOM, then the serialized
    /// page source, then media URLs seen on the network.
    pub async fn extract_media(&mut self, video_selectors: &[String]) -> Result<ExtractionResult> {
        self.page()?;
        let base = self.current_url().and_then(|u| Url::parse(u).ok());
        let limit = self.timeouts.element_wait();

        for selector in video_selectors {
            let outcome = timeout(limit, self.page()?.query_media(selector)).await;
            let candidates = match self.settle(outcome, &format!("query {}", selector), limit).await {
                Ok(found) => found,
                Err(StreamcastError::InvalidSelector(reason)) => {
                    warn!("Skipping video selector {}", reason);
                    continue;
                }
                Err(e) => return Err(e),
            };
            if let Some((url, kind)) = candidates
                .iter()
                .find_map(|c| media::classify_candidate(c, base.as_ref()))
            {
                info!("Selector {} matched {} ({})", selector, url, kind);
                return Ok(ExtractionResult::found(url, kind, Strategy::Browser));
            }
        }

        let source = self.get_page_source().await?;
        if let Some((url, kind)) = media::scan_text(&source, base.as_ref()) {
            info!("Found {} ({}) in rendered source", url, kind);
            return Ok(ExtractionResult::found(url, kind, Strategy::Browser));
        }

        let seen = match timeout(limit, self.page()?.media_requests()).await {
            Ok(seen) => seen,
            Err(_) => {
                warn!("Reading captured network traffic timed out");
                Vec::new()
            }
        };
        if let Some((url, kind)) = media::pick_network_media(&seen) {
            info!("Found {} ({}) in network traffic", url, kind);
            return Ok(ExtractionResult::found(url, kind, Strategy::Browser));
        }

        warn!("Could not find video URL in rendered page");
        Ok(ExtractionResult::not_found(Strategy::Browser))
    }

    /// Tear the browser down. Safe to call at any time.
    pub async fn quit(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        match timeout(CLOSE_TIMEOUT, session.page.close()).await {
            Ok(Ok(())) => info!("Browser session {} closed", session.id),
            Ok(Err(e)) => warn!("Error closing browser session {}: {}", session.id, e),
            Err(_) => warn!("Browser session {} did not close in time", session.id),
        }
    }

    fn page(&mut self) -> Result<&mut Box<dyn BrowserPage>> {
        self.session
            .as_mut()
            .map(|s| &mut s.page)
            .ok_or_else(|| StreamcastError::Browser("no browser session".to_string()))
    }

    /// Map a bounded page call to a result, dropping the session when the
    /// browser died underneath it.
    async fn settle<T>(
        &mut self,
        outcome: std::result::Result<Result<T>, Elapsed>,
        what: &str,
        limit: Duration,
    ) -> Result<T> {
        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                if e.is_fatal_browser() {
                    warn!("Browser failed during {}: {}", what, e);
                    self.quit().await;
                }
                Err(e)
            }
            Err(_) => Err(StreamcastError::timeout(what, limit)),
        }
    }
}

fn wrap_function_body(code: &str) -> String {
    let is_body = code.lines().any(|line| {
        let line = line.trim_start();
        line == "return"
            || line.starts_with("return ")
            || line.starts_with("return;")
            || line.starts_with("return(")
    });
    if is_body {
        format!("(function () {{\n{}\n}})()", code)
    } else {
        code.to_string()
    }
}
