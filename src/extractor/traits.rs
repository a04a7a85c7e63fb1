use crate::extractor::models::{ExtractionResult, StreamTarget, Strategy};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Core trait for the script-free extraction strategies
///
/// This trait isolates the coordinator from the specific extraction method
/// (plain HTTP fetch, yt-dlp, ...). Browser extraction is stateful and lives
/// on the `BrowserController` instead.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Returns a unique identifier for this extractor (e.g., "static-html", "ytdlp")
    fn id(&self) -> &'static str;

    /// Tag recorded in `ExtractionResult::strategy_used`
    fn strategy(&self) -> Strategy;

    /// Checks if this extractor can handle the given URL
    fn supports(&self, url: &str) -> bool {
        url.starts_with("http://") || url.starts_with("https://")
    }

    /// Looks for media behind `target.source_url`.
    ///
    /// A page without media is `Ok` with `media_kind: none`; `Err` is reserved
    /// for failures of the strategy itself.
    async fn extract(&self, target: &StreamTarget, timeout: Duration) -> Result<ExtractionResult>;
}
