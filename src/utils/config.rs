//! Player configuration

use crate::utils::error::{Result, StreamcastError};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Close-button patterns tried, in order, after every navigation.
pub const DEFAULT_POPUP_SELECTORS: &[&str] = &[
    "button[class*='close']",
    "div[class*='popup'] button",
    "a[class*='close']",
    "[id*='close']",
    ".modal-close",
    ".popup-close",
    "[aria-label*='close' i]",
];

/// Player patterns tried, in order, when locating the media element.
pub const DEFAULT_VIDEO_SELECTORS: &[&str] = &[
    "video",
    "iframe[src*='player']",
    "iframe[src*='embed']",
    "[class*='player']",
    "[id*='player']",
];

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub fn default_popup_selectors() -> Vec<String> {
    DEFAULT_POPUP_SELECTORS.iter().map(|s| s.to_string()).collect()
}

pub fn default_video_selectors() -> Vec<String> {
    DEFAULT_VIDEO_SELECTORS.iter().map(|s| s.to_string()).collect()
}

/// Player settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSettings {
    /// Display name of the player
    pub name: String,

    /// Page that hosts the stream
    pub stream_url: String,

    /// Cast device address
    pub tv_ip: String,

    /// Cast device friendly name
    pub tv_name: Option<String>,

    /// Drive a headless browser before falling back to a plain fetch
    pub use_browser: bool,

    pub popup_selectors: Vec<String>,

    pub video_selectors: Vec<String>,

    pub timeouts: TimeoutSettings,

    pub browser: BrowserSettings,

    pub ytdlp: YtDlpSettings,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            name: "Streaming Player".to_string(),
            stream_url: String::new(),
            tv_ip: String::new(),
            tv_name: None,
            use_browser: true,
            popup_selectors: default_popup_selectors(),
            video_selectors: default_video_selectors(),
            timeouts: TimeoutSettings::default(),
            browser: BrowserSettings::default(),
            ytdlp: YtDlpSettings::default(),
        }
    }
}

/// Per-operation time limits
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub page_load_secs: u64,
    pub element_wait_secs: u64,
    pub popup_settle_secs: u64,
    /// Budget for a single popup click attempt
    pub popup_click_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            page_load_secs: 30,
            element_wait_secs: 10,
            popup_settle_secs: 3,
            popup_click_ms: 2000,
        }
    }
}

impl TimeoutSettings {
    pub fn page_load(&self) -> Duration {
        Duration::from_secs(self.page_load_secs)
    }

    pub fn element_wait(&self) -> Duration {
        Duration::from_secs(self.element_wait_secs)
    }

    pub fn popup_settle(&self) -> Duration {
        Duration::from_secs(self.popup_settle_secs)
    }

    pub fn popup_click(&self) -> Duration {
        Duration::from_millis(self.popup_click_ms)
    }
}

/// Headless browser launch profile
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    /// Chrome/Chromium binary; autodetected when unset
    pub executable: Option<PathBuf>,
    pub window_width: u32,
    pub window_height: u32,
    pub user_agent: String,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            window_width: 1920,
            window_height: 1080,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct YtDlpSettings {
    pub enabled: bool,
    pub path: Option<PathBuf>,
}

impl PlayerSettings {
    /// Load settings from a JSON file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading settings from {:?}", path);
        let raw = std::fs::read_to_string(path)?;
        let mut settings: PlayerSettings = serde_json::from_str(&raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            warn!("No settings at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Reject malformed addresses and enforce sane minimums.
    pub fn validate(&mut self) -> Result<()> {
        self.stream_url = self.stream_url.trim().to_string();
        self.tv_ip = self.tv_ip.trim().to_string();

        if !self.stream_url.is_empty() {
            validate_stream_url(&self.stream_url)?;
        }
        if !self.tv_ip.is_empty() && self.tv_ip.parse::<IpAddr>().is_err() {
            return Err(StreamcastError::Config(format!(
                "tv_ip is not an IP address: {}",
                self.tv_ip
            )));
        }

        let t = &mut self.timeouts;
        if t.page_load_secs == 0 {
            t.page_load_secs = 1;
        }
        if t.element_wait_secs == 0 {
            t.element_wait_secs = 1;
        }
        if t.popup_click_ms == 0 {
            t.popup_click_ms = 100;
        }
        Ok(())
    }
}

/// Only absolute http(s) URLs can be fetched or navigated to.
pub fn validate_stream_url(raw: &str) -> Result<url::Url> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| StreamcastError::Config(format!("invalid stream URL {}: {}", raw, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(StreamcastError::Config(format!(
            "unsupported URL scheme {} in {}",
            other, raw
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PlayerSettings::default();
        assert!(config.use_browser);
        assert_eq!(config.popup_selectors.len(), DEFAULT_POPUP_SELECTORS.len());
        assert_eq!(config.video_selectors[0], "video");
        assert_eq!(config.timeouts.page_load(), Duration::from_secs(30));
        assert_eq!(config.timeouts.element_wait(), Duration::from_secs(10));
        assert_eq!(config.timeouts.popup_settle(), Duration::from_secs(3));
    }

    #[test]
    fn test_validation_enforces_minimums() {
        let mut config = PlayerSettings::default();
        config.timeouts.page_load_secs = 0;
        config.timeouts.element_wait_secs = 0;
        config.validate().unwrap();
        assert_eq!(config.timeouts.page_load_secs, 1);
        assert_eq!(config.timeouts.element_wait_secs, 1);
    }

    #[test]
    fn test_validation_rejects_bad_ip_and_scheme() {
        let mut config = PlayerSettings {
            tv_ip: "living-room".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(StreamcastError::Config(_))));

        let mut config = PlayerSettings {
            stream_url: "ftp://site.test/videos".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"stream_url": " https://site.test/videos ", "use_browser": false, "timeouts": {"element_wait_secs": 4}}"#,
        )
        .unwrap();

        let settings = PlayerSettings::load(&path).unwrap();
        assert_eq!(settings.stream_url, "https://site.test/videos");
        assert!(!settings.use_browser);
        assert_eq!(settings.timeouts.element_wait_secs, 4);
        assert_eq!(settings.timeouts.page_load_secs, 30);
        assert_eq!(settings.video_selectors, default_video_selectors());
    }

    #[test]
    fn test_save_then_load_or_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        assert!(PlayerSettings::load_or_default(&path)
            .unwrap()
            .stream_url
            .is_empty());

        let settings = PlayerSettings {
            tv_ip: "192.168.1.101".to_string(),
            tv_name: Some("Bedroom TV".to_string()),
            ..Default::default()
        };
        settings.save(&path).unwrap();
        let loaded = PlayerSettings::load_or_default(&path).unwrap();
        assert_eq!(loaded.tv_name.as_deref(), Some("Bedroom TV"));
    }
}
