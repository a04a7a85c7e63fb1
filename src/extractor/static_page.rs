//! Plain HTTP extraction
//!
//! Fetches the page once, without running scripts, and looks for media in the
//! returned markup. Popups are never handled here since they need JavaScript.

use crate::extractor::media::{self, MediaCandidate};
use crate::extractor::models::{ExtractionResult, MediaKind, StreamTarget, Strategy};
use crate::extractor::traits::Extractor;
use crate::utils::config::DEFAULT_USER_AGENT;
use crate::utils::error::{Result, StreamcastError};
use async_trait::async_trait;
use reqwest::header;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Static HTML extractor
#[derive(Debug, Clone)]
pub struct StaticExtractor {
    client: reqwest::Client,
    user_agent: String,
}

impl Default for StaticExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_USER_AGENT)
    }
}

impl StaticExtractor {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait]
impl Extractor for StaticExtractor {
    fn id(&self) -> &'static str {
        "static-html"
    }

    fn strategy(&self) -> Strategy {
        Strategy::Static
    }

    /// Fetch `target.source_url` and search it for media.
    ///
    /// Fails only for transport problems or a non-2xx status; a page without
    /// media yields a `none` result.
    async fn extract(&self, target: &StreamTarget, timeout: Duration) -> Result<ExtractionResult> {
        debug!("Static fetch of {}", target.source_url);

        let response = self
            .client
            .get(&target.source_url)
            .header(header::USER_AGENT, &self.user_agent)
            .header(
                header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.5")
            .header(header::REFERER, &target.source_url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| fetch_error(e, &target.source_url, timeout))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Static fetch of {} returned {}", target.source_url, status);
            return Err(StreamcastError::Network(format!(
                "{} returned HTTP {}",
                target.source_url, status
            )));
        }

        // Redirects move the base used for relative sources.
        let page_url = response.url().clone();
        let html = response
            .text()
            .await
            .map_err(|e| fetch_error(e, &target.source_url, timeout))?;

        let result = match find_media_in_html(&html, Some(&page_url), &target.video_selectors) {
            Some((url, kind)) => {
                info!("Static extraction found {} ({})", url, kind);
                ExtractionResult::found(url, kind, Strategy::Static)
            }
            None => {
                info!("Static extraction found no media on {}", target.source_url);
                ExtractionResult::not_found(Strategy::Static)
            }
        };
        Ok(result)
    }
}

fn fetch_error(e: reqwest::Error, url: &str, timeout: Duration) -> StreamcastError {
    if e.is_timeout() {
        StreamcastError::timeout(format!("fetch {}", url), timeout)
    } else {
        StreamcastError::from(e)
    }
}

/// Apply `video_selectors` in order, then fall back to inline scripts.
pub fn find_media_in_html(
    html: &str,
    base: Option<&Url>,
    video_selectors: &[String],
) -> Option<(String, MediaKind)> {
    let document = Html::parse_document(html);

    for raw in video_selectors {
        let selector = match Selector::parse(raw) {
            Ok(s) => s,
            Err(e) => {
                warn!("Skipping unparsable selector {:?}: {:?}", raw, e);
                continue;
            }
        };
        for element in document.select(&selector) {
            if let Some(found) = media::classify_candidate(&candidate_from(element), base) {
                debug!("Selector {:?} matched {}", raw, found.0);
                return Some(found);
            }
        }
    }

    scan_scripts(&document, base)
}

fn candidate_from(element: ElementRef<'_>) -> MediaCandidate {
    let el = element.value();
    let mut candidate = MediaCandidate::new(el.name());
    if let Some(src) = el.attr("src").or_else(|| el.attr("data-src")) {
        candidate = candidate.with_src(src);
    }
    for attr in ["class", "id"] {
        if let Some(value) = el.attr(attr) {
            candidate = candidate.with_class_or_id(value);
        }
    }

    let nested = element
        .descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .find(|child| {
            matches!(child.value().name(), "source" | "iframe") && child.value().attr("src").is_some()
        });
    if let Some(child) = nested {
        if let Some(src) = child.value().attr("src") {
            candidate = candidate.with_nested(child.value().name(), src);
        }
    }
    candidate
}

fn scan_scripts(document: &Html, base: Option<&Url>) -> Option<(String, MediaKind)> {
    let scripts = Selector::parse("script").ok()?;
    document
        .select(&scripts)
        .map(|s| s.text().collect::<String>())
        .find_map(|body| media::scan_text(&body, base))
}
