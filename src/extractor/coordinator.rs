use crate::browser::BrowserController;
use crate::extractor::models::{ExtractionResult, StreamTarget};
use crate::extractor::static_page::StaticExtractor;
use crate::extractor::traits::Extractor;
use crate::extractor::ytdlp::YtDlpExtractor;
use crate::utils::config::PlayerSettings;
use crate::utils::error::{Result, StreamcastError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Generation of the stream target an extraction was started for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// Outcome of a ticketed resolve
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Current(ExtractionResult),
    /// The target changed (or playback stopped) while extracting
    Superseded,
}

struct CachedResult {
    generation: u64,
    source_url: String,
    result: ExtractionResult,
}

/// The Extraction Coordinator
///
/// Picks the strategy for a target and falls back when the browser cannot be
/// used:
/// 1. yt-dlp, when configured (failures are absorbed)
/// 2. the browser, when `use_browser` is set (browser failures fall back)
/// 3. the static extractor
///
/// Every change of target bumps a generation counter; results produced for an
/// older generation are reported as superseded instead of being returned.
pub struct ExtractionCoordinator {
    static_extractor: Arc<dyn Extractor>,
    ytdlp: Option<Arc<dyn Extractor>>,
    fetch_timeout: Duration,
    generation: AtomicU64,
    cache: Mutex<Option<CachedResult>>,
}

impl ExtractionCoordinator {
    /// Create a coordinator with the given static strategy and no yt-dlp pass
    pub fn new(static_extractor: Arc<dyn Extractor>, fetch_timeout: Duration) -> Self {
        Self {
            static_extractor,
            ytdlp: None,
            fetch_timeout,
            generation: AtomicU64::new(0),
            cache: Mutex::new(None),
        }
    }

    pub fn from_settings(settings: &PlayerSettings) -> Self {
        let static_extractor = Arc::new(StaticExtractor::new(settings.browser.user_agent.clone()));
        let coordinator = Self::new(static_extractor, settings.timeouts.page_load());

        if !settings.ytdlp.enabled {
            return coordinator;
        }
        match YtDlpExtractor::new(settings.ytdlp.path.as_deref()) {
            Ok(ytdlp) => coordinator.with_ytdlp(Arc::new(ytdlp)),
            Err(e) => {
                warn!("yt-dlp strategy disabled: {}", e);
                coordinator
            }
        }
    }

    pub fn with_ytdlp(mut self, ytdlp: Arc<dyn Extractor>) -> Self {
        self.ytdlp = Some(ytdlp);
        self
    }

    pub fn ticket(&self) -> Ticket {
        Ticket(self.generation.load(Ordering::SeqCst))
    }

    /// Invalidate every extraction in flight and the cached result.
    pub fn supersede(&self) -> Ticket {
        let next = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).take();
        debug!("Extraction generation is now {}", next);
        Ticket(next)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.0
    }

    /// Resolve `target` once, outside any session.
    pub async fn resolve(
        &self,
        target: &StreamTarget,
        browser: &mut BrowserController,
    ) -> Result<ExtractionResult> {
        match self.resolve_for(self.ticket(), target, browser, false).await? {
            Resolution::Current(result) => Ok(result),
            Resolution::Superseded => Err(StreamcastError::ExtractionError(format!(
                "extraction of {} was superseded",
                target.source_url
            ))),
        }
    }

    /// Resolve `target` on behalf of the holder of `ticket`.
    ///
    /// With `staged` set the browser extracts from the page it is already
    /// showing instead of loading `source_url` again.
    pub async fn resolve_for(
        &self,
        ticket: Ticket,
        target: &StreamTarget,
        browser: &mut BrowserController,
        staged: bool,
    ) -> Result<Resolution> {
        if !self.is_current(ticket) {
            return Ok(Resolution::Superseded);
        }
        if !staged {
            if let Some(hit) = self.cached(ticket, &target.source_url) {
                debug!("Using cached extraction for {}", target.source_url);
                return Ok(Resolution::Current(hit));
            }
        }

        let outcome = self.run(target, browser, staged).await;

        if !self.is_current(ticket) {
            info!("Discarding extraction of superseded target {}", target.source_url);
            return Ok(Resolution::Superseded);
        }

        let result = outcome?;
        if !staged && result.playable_url().is_some() {
            *self.cache.lock().unwrap_or_else(|e| e.into_inner()) = Some(CachedResult {
                generation: ticket.0,
                source_url: target.source_url.clone(),
                result: result.clone(),
            });
        }
        Ok(Resolution::Current(result))
    }

    fn cached(&self, ticket: Ticket, source_url: &str) -> Option<ExtractionResult> {
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache
            .as_ref()
            .filter(|c| c.generation == ticket.0 && c.source_url == source_url)
            .map(|c| c.result.clone())
    }

    async fn run(
        &self,
        target: &StreamTarget,
        browser: &mut BrowserController,
        staged: bool,
    ) -> Result<ExtractionResult> {
        if let Some(ytdlp) = self.ytdlp.as_ref().filter(|_| !staged) {
            if ytdlp.supports(&target.source_url) {
                match ytdlp.extract(target, self.fetch_timeout).await {
                    Ok(result) if result.playable_url().is_some() => return Ok(result),
                    Ok(_) => debug!("{} found nothing for {}", ytdlp.id(), target.source_url),
                    Err(e) => info!("{} failed: {}. Continuing with page extraction", ytdlp.id(), e),
                }
            }
        }

        if target.use_browser {
            match browser_extract(target, browser, staged).await {
                Ok(result) => return Ok(result),
                Err(e) if falls_back(&e) => warn!(
                    "Browser extraction failed: {}. Falling back to {}",
                    e,
                    self.static_extractor.id()
                ),
                Err(e) => return Err(e),
            }
        }

        self.static_extractor.extract(target, self.fetch_timeout).await
    }
}

async fn browser_extract(
    target: &StreamTarget,
    browser: &mut BrowserController,
    staged: bool,
) -> Result<ExtractionResult> {
    browser.ensure_session().await?;
    if !staged || browser.current_url().is_none() {
        browser.navigate(&target.source_url).await?;
        browser.dismiss_popups(&target.popup_selectors).await?;
    } else {
        debug!("Extracting from staged page {:?}", browser.current_url());
    }
    browser.extract_media(&target.video_selectors).await
}

/// Failures of the browser strategy itself, as opposed to the page.
fn falls_back(e: &StreamcastError) -> bool {
    matches!(e, StreamcastError::Browser(_) | StreamcastError::Timeout { .. })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::driver::{BrowserDriver, BrowserPage};
    use crate::extractor::models::{MediaKind, Strategy};
    use crate::utils::config::TimeoutSettings;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct CountingExtractor {
        calls: AtomicUsize,
        result: ExtractionResult,
    }

    #[async_trait]
    impl Extractor for CountingExtractor {
        fn id(&self) -> &'static str {
            "counting"
        }

        fn strategy(&self) -> Strategy {
            Strategy::Static
        }

        async fn extract(&self, _: &StreamTarget, _: Duration) -> Result<ExtractionResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.result.clone())
        }
    }

    struct NoBrowser;

    #[async_trait]
    impl BrowserDriver for NoBrowser {
        fn id(&self) -> &'static str {
            "none"
        }

        async fn launch(&self) -> Result<Box<dyn BrowserPage>> {
            Err(StreamcastError::Browser("no browser installed".to_string()))
        }
    }

    fn setup(result: ExtractionResult) -> (Arc<CountingExtractor>, ExtractionCoordinator, BrowserController) {
        let extractor = Arc::new(CountingExtractor {
            calls: AtomicUsize::new(0),
            result,
        });
        let coordinator = ExtractionCoordinator::new(extractor.clone(), Duration::from_secs(1));
        let browser = BrowserController::new(Arc::new(NoBrowser), TimeoutSettings::default());
        (extractor, coordinator, browser)
    }

    fn target(use_browser: bool) -> StreamTarget {
        StreamTarget {
            source_url: "https://site.test/videos".to_string(),
            use_browser,
            popup_selectors: vec![],
            video_selectors: vec!["video".to_string()],
        }
    }

    #[tokio::test]
    async fn test_playable_result_is_cached_per_generation() {
        let found = ExtractionResult::found("https://cdn.test/a.mp4", MediaKind::DirectVideo, Strategy::Static);
        let (extractor, coordinator, mut browser) = setup(found.clone());

        assert_eq!(coordinator.resolve(&target(false), &mut browser).await.unwrap(), found);
        assert_eq!(coordinator.resolve(&target(false), &mut browser).await.unwrap(), found);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);

        coordinator.supersede();
        coordinator.resolve(&target(false), &mut browser).await.unwrap();
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_not_found_is_not_cached() {
        let (extractor, coordinator, mut browser) = setup(ExtractionResult::not_found(Strategy::Static));
        coordinator.resolve(&target(false), &mut browser).await.unwrap();
        coordinator.resolve(&target(false), &mut browser).await.unwrap();
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stale_ticket_is_superseded() {
        let (extractor, coordinator, mut browser) = setup(ExtractionResult::not_found(Strategy::Static));
        let stale = coordinator.ticket();
        let fresh = coordinator.supersede();
        assert!(!coordinator.is_current(stale));
        assert!(coordinator.is_current(fresh));

        let resolution = coordinator
            .resolve_for(stale, &target(false), &mut browser, false)
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::Superseded);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_launch_failure_falls_back_to_static() {
        let found = ExtractionResult::found("https://cdn.test/a.mp4", MediaKind::DirectVideo, Strategy::Static);
        let (extractor, coordinator, mut browser) = setup(found.clone());
        let result = coordinator.resolve(&target(true), &mut browser).await.unwrap();
        assert_eq!(result.strategy_used, Strategy::Static);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
        assert!(!browser.is_alive());
    }

    #[test]
    fn test_fallback_errors() {
        assert!(falls_back(&StreamcastError::Browser("crashed".into())));
        assert!(falls_back(&StreamcastError::timeout("load", Duration::from_secs(30))));
        assert!(!falls_back(&StreamcastError::Network("refused".into())));
    }
}
