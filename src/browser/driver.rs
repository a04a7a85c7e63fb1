use crate::extractor::media::MediaCandidate;
use crate::utils::error::{Result, StreamcastError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Launches headless browser processes
///
/// Isolates the controller from the automation backend (CDP, WebDriver, or a
/// scripted fake in tests).
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Returns a unique identifier for this driver (e.g., "chromium")
    fn id(&self) -> &'static str;

    /// Starts a new browser process with one blank page.
    async fn launch(&self) -> Result<Box<dyn BrowserPage>>;
}

/// The single page of a live browser process.
///
/// Implementations return `StreamcastError::Browser` when the process or its
/// connection is gone, `Script` for page-side exceptions and
/// `InvalidSelector` for selectors the page cannot parse.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Loads `url` and waits for the document to finish loading.
    async fn goto(&mut self, url: &str) -> Result<()>;

    async fn current_url(&mut self) -> Result<Option<String>>;

    /// Media-relevant facts for every element matching `selector`.
    async fn query_media(&mut self, selector: &str) -> Result<Vec<MediaCandidate>>;

    async fn is_present(&mut self, selector: &str) -> Result<bool>;

    /// Clicks the first match if it is visible and enabled. `Ok(false)` when
    /// there is nothing clickable yet.
    async fn click(&mut self, selector: &str) -> Result<bool>;

    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value>;

    /// Rendered HTML of the current document.
    async fn content(&mut self) -> Result<String>;

    async fn elements(&mut self, selector: &str) -> Result<Vec<ElementInfo>>;

    /// Media URLs observed on the wire since the last
    /// `clear_media_requests`. Empty when the backend cannot observe network
    /// traffic.
    async fn media_requests(&mut self) -> Vec<String>;

    /// Forget captured media URLs, so a new page starts from nothing.
    async fn clear_media_requests(&mut self);

    /// PNG capture of the viewport.
    async fn screenshot(&mut self) -> Result<Vec<u8>>;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// Summary of one DOM element for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementInfo {
    pub tag: String,
    pub text: String,
    pub href: Option<String>,
    pub src: Option<String>,
    pub class: Option<String>,
    pub id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Down,
    Up,
    Top,
    Bottom,
}

/// Pixels moved by a relative scroll
pub const SCROLL_STEP: i32 = 500;

impl ScrollDirection {
    pub fn script(&self) -> String {
        match self {
            ScrollDirection::Down => format!("window.scrollBy(0, {});", SCROLL_STEP),
            ScrollDirection::Up => format!("window.scrollBy(0, -{});", SCROLL_STEP),
            ScrollDirection::Top => "window.scrollTo(0, 0);".to_string(),
            ScrollDirection::Bottom => "window.scrollTo(0, document.body.scrollHeight);".to_string(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScrollDirection::Down => "down",
            ScrollDirection::Up => "up",
            ScrollDirection::Top => "top",
            ScrollDirection::Bottom => "bottom",
        }
    }
}

impl FromStr for ScrollDirection {
    type Err = StreamcastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "down" => Ok(ScrollDirection::Down),
            "up" => Ok(ScrollDirection::Up),
            "top" => Ok(ScrollDirection::Top),
            "bottom" => Ok(ScrollDirection::Bottom),
            other => Err(StreamcastError::Config(format!(
                "unknown scroll direction: {}",
                other
            ))),
        }
    }
}
