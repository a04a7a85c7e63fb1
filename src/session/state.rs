use crate::extractor::models::MediaKind;
use serde::{Deserialize, Serialize};

/// Playback lifecycle of one player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Idle,
    Loading,
    Extracting,
    Playing,
    Stopped,
    Error,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Loading => "loading",
            PlaybackState::Extracting => "extracting",
            PlaybackState::Playing => "playing",
            PlaybackState::Stopped => "stopped",
            PlaybackState::Error => "error",
        }
    }

    /// States in which a stream-URL change re-resolves immediately
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            PlaybackState::Loading | PlaybackState::Extracting | PlaybackState::Playing
        )
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a session for hosts and diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: PlaybackState,
    pub stream_url: String,
    pub video_url: Option<String>,
    pub media_kind: MediaKind,
    pub current_page_url: Option<String>,
    pub browser_active: bool,
    pub tv_ip: String,
    pub tv_name: Option<String>,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_states() {
        assert!(PlaybackState::Playing.is_active());
        assert!(PlaybackState::Extracting.is_active());
        assert!(!PlaybackState::Error.is_active());
        assert!(!PlaybackState::Stopped.is_active());
        assert_eq!(serde_json::to_string(&PlaybackState::Idle).unwrap(), "\"idle\"");
    }
}
