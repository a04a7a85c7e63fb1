//! Data structures for extraction targets and results

use crate::utils::config::PlayerSettings;
use serde::{Deserialize, Serialize};

/// What to extract and how. Replaced wholesale, never edited in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamTarget {
    pub source_url: String,
    pub use_browser: bool,
    pub popup_selectors: Vec<String>,
    pub video_selectors: Vec<String>,
}

impl StreamTarget {
    /// Target using the selector lists and strategy from `settings`.
    pub fn from_settings(source_url: impl Into<String>, settings: &PlayerSettings) -> Self {
        Self {
            source_url: source_url.into(),
            use_browser: settings.use_browser,
            popup_selectors: settings.popup_selectors.clone(),
            video_selectors: settings.video_selectors.clone(),
        }
    }

    pub fn with_browser(mut self, use_browser: bool) -> Self {
        self.use_browser = use_browser;
        self
    }
}

/// Classification of a discovered media resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    DirectVideo,
    HlsStream,
    EmbeddedPlayer,
    None,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::DirectVideo => "direct_video",
            MediaKind::HlsStream => "hls_stream",
            MediaKind::EmbeddedPlayer => "embedded_player",
            MediaKind::None => "none",
        }
    }

    /// MIME hint handed to the cast sink.
    ///
    /// Embedded players have no intrinsic type; receivers are asked to treat
    /// them as MP4.
    pub fn mime_hint(&self, media_url: &str) -> &'static str {
        match self {
            MediaKind::HlsStream => "application/x-mpegURL",
            MediaKind::DirectVideo if url_path_lower(media_url).ends_with(".webm") => "video/webm",
            _ => "video/mp4",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which extraction strategy produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Static,
    Browser,
    YtDlp,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Static => "static",
            Strategy::Browser => "browser",
            Strategy::YtDlp => "ytdlp",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one extraction attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub media_url: Option<String>,
    pub media_kind: MediaKind,
    pub strategy_used: Strategy,
}

impl ExtractionResult {
    pub fn found(media_url: impl Into<String>, media_kind: MediaKind, strategy: Strategy) -> Self {
        Self {
            media_url: Some(media_url.into()),
            media_kind,
            strategy_used: strategy,
        }
    }

    pub fn not_found(strategy: Strategy) -> Self {
        Self {
            media_url: None,
            media_kind: MediaKind::None,
            strategy_used: strategy,
        }
    }

    /// URL worth handing to a cast sink, if any.
    pub fn playable_url(&self) -> Option<&str> {
        match self.media_kind {
            MediaKind::None => None,
            _ => self.media_url.as_deref(),
        }
    }
}

/// Lowercased URL path without query or fragment.
pub(crate) fn url_path_lower(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(u) => u.path().to_ascii_lowercase(),
        Err(_) => raw
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase(),
    }
}
