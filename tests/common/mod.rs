//! Scripted browser and cast sink shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use streamcast::browser::{BrowserDriver, BrowserPage, ElementInfo};
use streamcast::cast::{CastSink, CastTarget};
use streamcast::extractor::media::MediaCandidate;
use streamcast::extractor::{ExtractionCoordinator, MediaKind, StaticExtractor};
use streamcast::utils::config::TimeoutSettings;
use streamcast::{PlaybackSession, PlayerSettings, Result, StreamcastError};
use tokio::sync::{Notify, Semaphore};

/// What the fake browser shows for one URL
#[derive(Debug, Clone, Default)]
pub struct PageSpec {
    pub html: String,
    pub media: HashMap<String, Vec<MediaCandidate>>,
    pub clickable: Vec<String>,
    pub network: Vec<String>,
    pub elements: HashMap<String, Vec<ElementInfo>>,
}

impl PageSpec {
    pub fn empty() -> Self {
        Self::default()
    }

    /// A page whose `video` selector matches a `<video src=url>` element
    pub fn with_video(url: &str) -> Self {
        Self::default().media("video", MediaCandidate::new("video").with_src(url))
    }

    pub fn media(mut self, selector: &str, candidate: MediaCandidate) -> Self {
        self.media.entry(selector.to_string()).or_default().push(candidate);
        self
    }

    pub fn html(mut self, html: &str) -> Self {
        self.html = html.to_string();
        self
    }

    pub fn clickable(mut self, selector: &str) -> Self {
        self.clickable.push(selector.to_string());
        self
    }

    pub fn network(mut self, url: &str) -> Self {
        self.network.push(url.to_string());
        self
    }
}

#[derive(Default)]
struct FakeState {
    pages: Mutex<HashMap<String, PageSpec>>,
    log: Mutex<Vec<String>>,
    launches: AtomicUsize,
    closes: AtomicUsize,
    fail_launch: AtomicBool,
    crash_on_goto: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    goto_gate: Mutex<Option<Arc<Semaphore>>>,
    goto_started: Notify,
    observed: Mutex<Vec<String>>,
    stall_media_requests: AtomicBool,
}

impl FakeState {
    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }

    fn spec(&self, url: Option<&str>) -> PageSpec {
        url.and_then(|u| self.pages.lock().unwrap().get(u).cloned())
            .unwrap_or_default()
    }
}

/// Tracks overlapping page operations
struct InFlight<'a>(&'a FakeState);

impl<'a> InFlight<'a> {
    fn enter(state: &'a FakeState) -> Self {
        let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(state)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Scripted stand-in for a headless browser
#[derive(Clone, Default)]
pub struct FakeDriver {
    state: Arc<FakeState>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, spec: PageSpec) -> Self {
        self.set_page(url, spec);
        self
    }

    pub fn set_page(&self, url: &str, spec: PageSpec) {
        self.state.pages.lock().unwrap().insert(url.to_string(), spec);
    }

    pub fn fail_launch(&self, fail: bool) {
        self.state.fail_launch.store(fail, Ordering::SeqCst);
    }

    pub fn crash_on_goto(&self, crash: bool) {
        self.state.crash_on_goto.store(crash, Ordering::SeqCst);
    }

    /// Make `media_requests` hang, like a page whose listener never yields.
    pub fn stall_media_requests(&self, stall: bool) {
        self.state.stall_media_requests.store(stall, Ordering::SeqCst);
    }

    /// Hold every `goto` until permits are added to the returned semaphore.
    pub fn gate_goto(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.state.goto_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Resolves once a `goto` has started (and is possibly held at the gate).
    pub async fn goto_started(&self) {
        self.state.goto_started.notified().await;
    }

    pub fn launches(&self) -> usize {
        self.state.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Vec<String> {
        self.state.log.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.log().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    fn id(&self) -> &'static str {
        "fake"
    }

    async fn launch(&self) -> Result<Box<dyn BrowserPage>> {
        if self.state.fail_launch.load(Ordering::SeqCst) {
            self.state.record("launch failed".to_string());
            return Err(StreamcastError::Browser("chromium not installed".to_string()));
        }
        self.state.launches.fetch_add(1, Ordering::SeqCst);
        self.state.record("launch".to_string());
        Ok(Box::new(FakePage {
            state: self.state.clone(),
            current: None,
        }))
    }
}

struct FakePage {
    state: Arc<FakeState>,
    current: Option<String>,
}

impl FakePage {
    fn spec(&self) -> PageSpec {
        self.state.spec(self.current.as_deref())
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn goto(&mut self, url: &str) -> Result<()> {
        let state = self.state.clone();
        let _op = InFlight::enter(&state);
        state.record(format!("goto {}", url));
        state.goto_started.notify_one();

        let gate = state.goto_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|_| StreamcastError::Browser("gate closed".to_string()))?;
        }

        if state.crash_on_goto.load(Ordering::SeqCst) {
            return Err(StreamcastError::Browser("target crashed".to_string()));
        }
        self.current = Some(url.to_string());
        // Responses pile up like a real network listener until cleared.
        let network = self.spec().network;
        state.observed.lock().unwrap().extend(network);
        Ok(())
    }

    async fn current_url(&mut self) -> Result<Option<String>> {
        Ok(self.current.clone())
    }

    async fn query_media(&mut self, selector: &str) -> Result<Vec<MediaCandidate>> {
        let _op = InFlight::enter(&self.state);
        if selector.contains("[[") {
            return Err(StreamcastError::InvalidSelector(selector.to_string()));
        }
        Ok(self.spec().media.get(selector).cloned().unwrap_or_default())
    }

    async fn is_present(&mut self, selector: &str) -> Result<bool> {
        let spec = self.spec();
        Ok(spec.media.get(selector).is_some_and(|m| !m.is_empty())
            || spec.clickable.iter().any(|c| c == selector)
            || spec.elements.contains_key(selector))
    }

    async fn click(&mut self, selector: &str) -> Result<bool> {
        let _op = InFlight::enter(&self.state);
        let hit = self.spec().clickable.iter().any(|c| c == selector);
        if hit {
            self.state.record(format!("click {}", selector));
        }
        Ok(hit)
    }

    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value> {
        let _op = InFlight::enter(&self.state);
        self.state.record(format!("eval {}", script));
        if script.contains("throw") {
            return Err(StreamcastError::Script("Uncaught Error: boom".to_string()));
        }
        Ok(serde_json::Value::String(script.to_string()))
    }

    async fn content(&mut self) -> Result<String> {
        Ok(self.spec().html)
    }

    async fn elements(&mut self, selector: &str) -> Result<Vec<ElementInfo>> {
        Ok(self.spec().elements.get(selector).cloned().unwrap_or_default())
    }

    async fn media_requests(&mut self) -> Vec<String> {
        if self.state.stall_media_requests.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.state.observed.lock().unwrap().clone()
    }

    async fn clear_media_requests(&mut self) {
        self.state.observed.lock().unwrap().clear();
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>> {
        self.state.record("screenshot".to_string());
        Ok(FAKE_PNG.to_vec())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        self.state.record("close".to_string());
        Ok(())
    }
}

/// Bytes every fake screenshot returns
pub const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake";

/// Cast sink that remembers every call
#[derive(Default)]
pub struct RecordingSink {
    pub pushes: Mutex<Vec<(String, MediaKind, CastTarget)>>,
    pub stops: Mutex<Vec<CastTarget>>,
    fail_push: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_push(&self, fail: bool) {
        self.fail_push.store(fail, Ordering::SeqCst);
    }

    pub fn pushes(&self) -> Vec<(String, MediaKind, CastTarget)> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn stops(&self) -> Vec<CastTarget> {
        self.stops.lock().unwrap().clone()
    }
}

#[async_trait]
impl CastSink for RecordingSink {
    fn id(&self) -> &'static str {
        "recording"
    }

    async fn push(&self, media_url: &str, media_kind: MediaKind, target: &CastTarget) -> Result<()> {
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(StreamcastError::Cast(format!("{} refused the connection", target.device_ip)));
        }
        self.pushes
            .lock()
            .unwrap()
            .push((media_url.to_string(), media_kind, target.clone()));
        Ok(())
    }

    async fn stop(&self, target: &CastTarget) -> Result<()> {
        self.stops.lock().unwrap().push(target.clone());
        Ok(())
    }

    async fn discover(&self, _timeout: Duration) -> Result<Vec<CastTarget>> {
        Ok(vec![CastTarget {
            device_ip: "192.168.1.50".to_string(),
            device_name: Some("Living Room".to_string()),
        }])
    }
}

/// Fast timeouts, no popup settle delay
pub fn test_timeouts() -> TimeoutSettings {
    TimeoutSettings {
        page_load_secs: 5,
        element_wait_secs: 1,
        popup_settle_secs: 0,
        popup_click_ms: 200,
    }
}

pub fn test_settings(stream_url: &str) -> PlayerSettings {
    PlayerSettings {
        stream_url: stream_url.to_string(),
        tv_ip: "192.168.1.50".to_string(),
        tv_name: Some("Living Room".to_string()),
        timeouts: test_timeouts(),
        ..Default::default()
    }
}

pub fn coordinator() -> Arc<ExtractionCoordinator> {
    Arc::new(ExtractionCoordinator::new(
        Arc::new(StaticExtractor::default()),
        Duration::from_secs(5),
    ))
}

pub fn session(settings: &PlayerSettings, driver: &FakeDriver, sink: &Arc<RecordingSink>) -> Arc<PlaybackSession> {
    Arc::new(PlaybackSession::with_coordinator(
        settings,
        coordinator(),
        Arc::new(driver.clone()),
        sink.clone(),
    ))
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
