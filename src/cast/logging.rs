use crate::cast::{CastSink, CastTarget};
use crate::extractor::models::MediaKind;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

/// Sink that only logs what would have been cast
#[derive(Debug, Clone, Default)]
pub struct LoggingSink;

#[async_trait]
impl CastSink for LoggingSink {
    fn id(&self) -> &'static str {
        "log"
    }

    async fn push(&self, media_url: &str, media_kind: MediaKind, target: &CastTarget) -> Result<()> {
        info!(
            "Would cast {} ({}, {}) to {}",
            media_url,
            media_kind,
            media_kind.mime_hint(media_url),
            target.label()
        );
        Ok(())
    }

    async fn stop(&self, target: &CastTarget) -> Result<()> {
        info!("Would stop playback on {}", target.label());
        Ok(())
    }

    async fn discover(&self, _timeout: Duration) -> Result<Vec<CastTarget>> {
        Ok(Vec::new())
    }
}
