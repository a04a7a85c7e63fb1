//! Cast sink abstraction
//!
//! The playback session hands a resolved media URL to a `CastSink`; the
//! device protocol itself lives behind the trait.

pub mod chromecast;
pub mod logging;

use crate::extractor::models::MediaKind;
use crate::utils::error::{Result, StreamcastError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

pub use chromecast::ChromecastSink;
pub use logging::LoggingSink;

/// Device media is pushed to. Replaced wholesale, never edited in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastTarget {
    pub device_ip: String,
    pub device_name: Option<String>,
}

impl CastTarget {
    /// Build a target, rejecting addresses that are not IP literals.
    pub fn new(device_ip: &str, device_name: Option<String>) -> Result<Self> {
        let device_ip = device_ip.trim();
        device_ip
            .parse::<IpAddr>()
            .map_err(|_| StreamcastError::Config(format!("not an IP address: {}", device_ip)))?;
        Ok(Self {
            device_ip: device_ip.to_string(),
            device_name: device_name.filter(|n| !n.trim().is_empty()),
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.device_ip.is_empty()
    }

    /// Friendly name when known, the address otherwise
    pub fn label(&self) -> &str {
        self.device_name.as_deref().unwrap_or(&self.device_ip)
    }
}

/// Receiver of resolved media
#[async_trait]
pub trait CastSink: Send + Sync {
    /// Returns a unique identifier for this sink (e.g., "chromecast")
    fn id(&self) -> &'static str;

    /// Start playing `media_url` on `target`. Fails with `StreamcastError::Cast`.
    async fn push(&self, media_url: &str, media_kind: MediaKind, target: &CastTarget) -> Result<()>;

    /// Stop whatever `target` is playing.
    async fn stop(&self, target: &CastTarget) -> Result<()>;

    /// Devices reachable within `timeout`. Diagnostics only.
    async fn discover(&self, timeout: Duration) -> Result<Vec<CastTarget>>;
}
