//! Playback session state machine
//!
//! One `PlaybackSession` per player. Operations that touch the browser are
//! serialized by the `core` lock; the observable state lives behind a
//! separate lock so snapshots and `stop()` never wait on a slow page.

use crate::browser::{BrowserController, BrowserDriver, ElementInfo, ScrollDirection};
use crate::cast::{CastSink, CastTarget};
use crate::extractor::coordinator::{ExtractionCoordinator, Resolution, Ticket};
use crate::extractor::models::{ExtractionResult, MediaKind, StreamTarget};
use crate::session::messages::SessionEvent;
use crate::session::state::{PlaybackState, SessionSnapshot};
use crate::utils::config::{validate_stream_url, PlayerSettings};
use crate::utils::error::{Result, StreamcastError};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, MutexGuard, RwLock};
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 100;

/// Owned browser side of the session
struct SessionCore {
    browser: BrowserController,
}

struct SessionState {
    playback: PlaybackState,
    target: StreamTarget,
    cast_target: CastTarget,
    last_extraction: Option<ExtractionResult>,
    /// Device currently showing our media
    casting: Option<CastTarget>,
    /// The page was prepared with navigation primitives; extract from it as is
    page_staged: bool,
    browser_active: bool,
    current_page_url: Option<String>,
    last_error: Option<String>,
}

pub struct PlaybackSession {
    name: String,
    coordinator: Arc<ExtractionCoordinator>,
    sink: Arc<dyn CastSink>,
    core: Mutex<SessionCore>,
    state: RwLock<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    element_wait: Duration,
}

impl PlaybackSession {
    pub fn new(settings: &PlayerSettings, driver: Arc<dyn BrowserDriver>, sink: Arc<dyn CastSink>) -> Self {
        let coordinator = Arc::new(ExtractionCoordinator::from_settings(settings));
        Self::with_coordinator(settings, coordinator, driver, sink)
    }

    pub fn with_coordinator(
        settings: &PlayerSettings,
        coordinator: Arc<ExtractionCoordinator>,
        driver: Arc<dyn BrowserDriver>,
        sink: Arc<dyn CastSink>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let cast_target = CastTarget {
            device_ip: settings.tv_ip.clone(),
            device_name: settings.tv_name.clone(),
        };

        Self {
            name: settings.name.clone(),
            coordinator,
            sink,
            core: Mutex::new(SessionCore {
                browser: BrowserController::new(driver, settings.timeouts),
            }),
            state: RwLock::new(SessionState {
                playback: PlaybackState::Idle,
                target: StreamTarget::from_settings(settings.stream_url.clone(), settings),
                cast_target,
                last_extraction: None,
                casting: None,
                page_staged: false,
                browser_active: false,
                current_page_url: None,
                last_error: None,
            }),
            events,
            element_wait: settings.timeouts.element_wait(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> PlaybackState {
        self.state.read().await.playback
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let st = self.state.read().await;
        let playable = st.last_extraction.as_ref().filter(|r| r.playable_url().is_some());
        SessionSnapshot {
            state: st.playback,
            stream_url: st.target.source_url.clone(),
            video_url: playable.and_then(|r| r.media_url.clone()),
            media_kind: playable.map(|r| r.media_kind).unwrap_or(MediaKind::None),
            current_page_url: st.current_page_url.clone(),
            browser_active: st.browser_active,
            tv_ip: st.cast_target.device_ip.clone(),
            tv_name: st.cast_target.device_name.clone(),
            last_error: st.last_error.clone(),
        }
    }

    pub async fn last_extraction(&self) -> Option<ExtractionResult> {
        self.state.read().await.last_extraction.clone()
    }

    // ============================================================
    // Playback
    // ============================================================

    /// Resolve the current target and cast it.
    ///
    /// A play that is overtaken by `stop()` or a new stream URL returns
    /// `Ok(())` without touching the state the newer command produced. That
    /// includes a play still queued behind another one when the newer
    /// command arrives.
    pub async fn play(&self) -> Result<()> {
        let ticket = self.coordinator.ticket();
        let mut core = self.core.lock().await;

        let (target, staged) = {
            let mut st = self.state.write().await;
            if !self.coordinator.is_current(ticket) {
                debug!("Play request was superseded while queued");
                return Ok(());
            }
            if st.target.source_url.is_empty() {
                let err = StreamcastError::Config("no stream URL configured".to_string());
                self.record_error(&mut st, "play", &err);
                return Err(err);
            }
            self.transition(&mut st, PlaybackState::Loading);
            (st.target.clone(), st.page_staged)
        };

        if target.use_browser {
            // A browser that will not start is handled by the static fallback.
            if let Err(e) = core.browser.ensure_session().await {
                warn!("Browser unavailable for {}: {}", target.source_url, e);
            }
            self.sync_browser(&core.browser).await;
        }

        if !self.advance(ticket, PlaybackState::Extracting).await {
            return Ok(());
        }

        let resolution = self
            .coordinator
            .resolve_for(ticket, &target, &mut core.browser, staged)
            .await;
        self.sync_browser(&core.browser).await;

        let result = match resolution {
            Ok(Resolution::Current(result)) => result,
            Ok(Resolution::Superseded) => return Ok(()),
            Err(e) => {
                self.fail_if_current(ticket, "play", &e).await;
                return Err(e);
            }
        };

        let media_url = result.playable_url().map(str::to_string);
        let Some(media_url) = media_url else {
            let err = StreamcastError::NoMedia(target.source_url.clone());
            let mut st = self.state.write().await;
            if self.coordinator.is_current(ticket) {
                st.last_extraction = Some(result);
                st.page_staged = false;
                self.fail(&mut st, "play", &err);
            }
            return Err(err);
        };

        let cast_target = {
            let mut st = self.state.write().await;
            if !self.coordinator.is_current(ticket) {
                return Ok(());
            }
            st.last_extraction = Some(result.clone());
            st.page_staged = false;
            st.cast_target.clone()
        };
        let _ = self.events.send(SessionEvent::MediaResolved {
            media_url: media_url.clone(),
            media_kind: result.media_kind,
            strategy: result.strategy_used,
        });

        if let Err(e) = self.sink.push(&media_url, result.media_kind, &cast_target).await {
            error!("Cast to {} failed: {}", cast_target.label(), e);
            self.fail_if_current(ticket, "play", &e).await;
            return Err(e);
        }

        let mut st = self.state.write().await;
        if !self.coordinator.is_current(ticket) {
            drop(st);
            info!("Playback was superseded while casting; stopping {}", cast_target.label());
            if let Err(e) = self.sink.stop(&cast_target).await {
                warn!("Failed to undo superseded cast: {}", e);
            }
            return Ok(());
        }
        st.casting = Some(cast_target);
        st.last_error = None;
        self.transition(&mut st, PlaybackState::Playing);
        info!("Playing {} ({})", media_url, result.media_kind);
        Ok(())
    }

    /// Stop playback and release the browser. Idempotent.
    pub async fn stop(&self) -> Result<()> {
        {
            let mut st = self.state.write().await;
            if st.playback == PlaybackState::Stopped {
                debug!("Stop requested while already stopped");
                return Ok(());
            }
            self.coordinator.supersede();
            st.last_extraction = None;
            st.page_staged = false;
            self.transition(&mut st, PlaybackState::Stopped);
        }

        let mut core = self.core.lock().await;
        if self.state.read().await.playback != PlaybackState::Stopped {
            // A play issued after this stop already restarted the session.
            return Ok(());
        }
        core.browser.quit().await;
        self.sync_browser(&core.browser).await;

        let casting = self.state.write().await.casting.take();
        if let Some(target) = casting {
            if let Err(e) = self.sink.stop(&target).await {
                warn!("Failed to stop cast on {}: {}", target.label(), e);
            }
        }
        info!("Playback stopped");
        Ok(())
    }

    /// Switch to a new page, keeping the current selector overrides.
    pub async fn set_stream_url(&self, url: &str) -> Result<()> {
        let url = url.trim();
        validate_stream_url(url)?;
        let target = StreamTarget {
            source_url: url.to_string(),
            ..self.state.read().await.target.clone()
        };
        self.set_stream_target(target).await
    }

    /// Replace the stream target; re-resolves at once while playing.
    pub async fn set_stream_target(&self, target: StreamTarget) -> Result<()> {
        validate_stream_url(&target.source_url)?;

        let replay = {
            let mut st = self.state.write().await;
            self.coordinator.supersede();
            info!("Stream target set to {}", target.source_url);
            st.target = target;
            st.last_extraction = None;
            st.page_staged = false;
            let replay = st.playback.is_active();
            if replay {
                self.transition(&mut st, PlaybackState::Loading);
            }
            replay
        };

        if replay {
            self.play().await
        } else {
            Ok(())
        }
    }

    /// Point the next push at another device. In-flight work is unaffected.
    pub async fn set_tv(&self, ip: &str, name: Option<String>) -> Result<()> {
        let target = CastTarget::new(ip, name)?;
        info!("Cast target set to {} ({})", target.label(), target.device_ip);
        self.state.write().await.cast_target = target;
        Ok(())
    }

    // ============================================================
    // Page primitives
    // ============================================================

    pub async fn navigate_url(&self, url: &str) -> Result<()> {
        validate_stream_url(url)?;
        let mut core = self.lock_page("navigate_url").await?;
        let popups = self.state.read().await.target.popup_selectors.clone();
        let outcome = async {
            core.browser.navigate(url).await?;
            core.browser.dismiss_popups(&popups).await?;
            Ok::<(), StreamcastError>(())
        }
        .await;
        self.finish("navigate_url", &core.browser, outcome, true).await
    }

    pub async fn click_element(&self, selector: &str, timeout: Option<Duration>) -> Result<()> {
        let wait = timeout.unwrap_or(self.element_wait);
        let mut core = self.lock_page("click_element").await?;
        let outcome = core.browser.click(selector, wait).await;
        self.finish("click_element", &core.browser, outcome, true).await
    }

    pub async fn scroll_page(&self, direction: ScrollDirection) -> Result<()> {
        let mut core = self.lock_page("scroll_page").await?;
        let outcome = core.browser.scroll(direction).await;
        self.finish("scroll_page", &core.browser, outcome, true).await
    }

    pub async fn wait_for_element(&self, selector: &str, timeout: Option<Duration>) -> Result<()> {
        let wait = timeout.unwrap_or(self.element_wait);
        let mut core = self.lock_page("wait_for_element").await?;
        let outcome = core.browser.wait_for(selector, wait).await;
        self.finish("wait_for_element", &core.browser, outcome, false).await
    }

    pub async fn execute_script(&self, script: &str) -> Result<serde_json::Value> {
        let mut core = self.lock_page("execute_script").await?;
        let outcome = core.browser.execute_script(script).await;
        self.finish("execute_script", &core.browser, outcome, true).await
    }

    pub async fn get_page_source(&self) -> Result<String> {
        let mut core = self.lock_page("get_page_source").await?;
        let outcome = core.browser.get_page_source().await;
        self.finish("get_page_source", &core.browser, outcome, false).await
    }

    pub async fn get_current_url(&self) -> Result<Option<String>> {
        let mut core = self.lock_page("get_current_url").await?;
        let outcome = core.browser.get_current_url().await;
        self.finish("get_current_url", &core.browser, outcome, false).await
    }

    pub async fn get_elements(&self, selector: &str) -> Result<Vec<ElementInfo>> {
        let mut core = self.lock_page("get_elements").await?;
        let outcome = core.browser.get_elements(selector).await;
        self.finish("get_elements", &core.browser, outcome, false).await
    }

    pub async fn take_screenshot(&self, path: &Path) -> Result<()> {
        let mut core = self.lock_page("take_screenshot").await?;
        let outcome = core.browser.take_screenshot(path).await;
        self.finish("take_screenshot", &core.browser, outcome, false).await
    }

    /// Stop and make sure no browser outlives the session.
    pub async fn shutdown(&self) {
        if let Err(e) = self.stop().await {
            warn!("Error while stopping session: {}", e);
        }
        let mut core = self.core.lock().await;
        core.browser.quit().await;
        self.sync_browser(&core.browser).await;
        info!("Session {} shut down", self.name);
    }

    // ============================================================
    // Helpers
    // ============================================================

    /// Take the core lock for a page primitive; refused while stopped.
    async fn lock_page(&self, command: &str) -> Result<MutexGuard<'_, SessionCore>> {
        self.ensure_not_stopped(command).await?;
        let core = self.core.lock().await;
        self.ensure_not_stopped(command).await?;
        Ok(core)
    }

    async fn ensure_not_stopped(&self, command: &str) -> Result<()> {
        let state = self.state.read().await.playback;
        if state == PlaybackState::Stopped {
            return Err(StreamcastError::InvalidState {
                state: state.to_string(),
                command: command.to_string(),
            });
        }
        Ok(())
    }

    /// Publish browser liveness and report a primitive's outcome without
    /// touching the playback state.
    async fn finish<T>(
        &self,
        command: &str,
        browser: &BrowserController,
        outcome: Result<T>,
        stages_page: bool,
    ) -> Result<T> {
        self.sync_browser(browser).await;
        let mut st = self.state.write().await;
        match &outcome {
            Ok(_) if stages_page && browser.is_alive() => st.page_staged = true,
            Ok(_) => {}
            Err(e) => self.record_error(&mut st, command, e),
        }
        outcome
    }

    async fn sync_browser(&self, browser: &BrowserController) {
        let mut st = self.state.write().await;
        st.browser_active = browser.is_alive();
        st.current_page_url = browser.current_url().map(str::to_string);
        if !st.browser_active {
            st.page_staged = false;
        }
    }

    /// Move to `to` unless the extraction identified by `ticket` is stale.
    async fn advance(&self, ticket: Ticket, to: PlaybackState) -> bool {
        let mut st = self.state.write().await;
        if !self.coordinator.is_current(ticket) {
            return false;
        }
        self.transition(&mut st, to);
        true
    }

    async fn fail_if_current(&self, ticket: Ticket, command: &str, err: &StreamcastError) {
        let mut st = self.state.write().await;
        if self.coordinator.is_current(ticket) {
            self.fail(&mut st, command, err);
        }
    }

    fn transition(&self, st: &mut SessionState, to: PlaybackState) {
        if st.playback == to {
            return;
        }
        let from = std::mem::replace(&mut st.playback, to);
        info!("Playback state: {} -> {}", from, to);
        let _ = self.events.send(SessionEvent::StateChanged { from, to });
    }

    fn fail(&self, st: &mut SessionState, command: &str, err: &StreamcastError) {
        self.record_error(st, command, err);
        self.transition(st, PlaybackState::Error);
    }

    fn record_error(&self, st: &mut SessionState, command: &str, err: &StreamcastError) {
        warn!("{} failed: {}", command, err);
        st.last_error = Some(err.to_string());
        let _ = self.events.send(SessionEvent::Error {
            command: command.to_string(),
            message: err.to_string(),
        });
    }
}
