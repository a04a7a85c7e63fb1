//! Error handling for streamcast

use thiserror::Error;

/// Main error type for streamcast
#[derive(Debug, Error)]
pub enum StreamcastError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Timed out after {secs:.1}s: {what}")]
    Timeout { what: String, secs: f64 },

    #[error("Script error: {0}")]
    Script(String),

    #[error("Cast error: {0}")]
    Cast(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Not allowed while {state}: {command}")]
    InvalidState { state: String, command: String },

    #[error("No playable media found on {0}")]
    NoMedia(String),

    #[error("yt-dlp not found. Please install yt-dlp")]
    YtDlpNotFound,

    #[error("Failed to extract media: {0}")]
    ExtractionError(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StreamcastError {
    pub fn timeout(what: impl Into<String>, limit: std::time::Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            secs: limit.as_secs_f64(),
        }
    }

    /// Failures after which the browser session can no longer be trusted.
    pub fn is_fatal_browser(&self) -> bool {
        matches!(self, Self::Browser(_))
    }
}

impl From<reqwest::Error> for StreamcastError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StreamcastError>;
