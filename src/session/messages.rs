use crate::browser::{ElementInfo, ScrollDirection};
use crate::extractor::models::{MediaKind, Strategy};
use crate::session::state::{PlaybackState, SessionSnapshot};
use crate::utils::error::Result;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::oneshot;

pub type Reply<T> = oneshot::Sender<Result<T>>;

/// Commands sent from a host shell to the session actor
#[derive(Debug)]
pub enum SessionCommand {
    // Playback
    Play {
        reply: Reply<()>,
    },
    Stop {
        reply: Reply<()>,
    },
    SetStreamUrl {
        url: String,
        reply: Reply<()>,
    },
    SetTv {
        ip: String,
        name: Option<String>,
        reply: Reply<()>,
    },

    // Page primitives
    Navigate {
        url: String,
        reply: Reply<()>,
    },
    Click {
        selector: String,
        timeout: Option<Duration>,
        reply: Reply<()>,
    },
    Scroll {
        direction: ScrollDirection,
        reply: Reply<()>,
    },
    WaitFor {
        selector: String,
        timeout: Option<Duration>,
        reply: Reply<()>,
    },
    ExecuteScript {
        script: String,
        reply: Reply<serde_json::Value>,
    },
    GetPageSource {
        reply: Reply<String>,
    },
    GetCurrentUrl {
        reply: Reply<Option<String>>,
    },
    GetElements {
        selector: String,
        reply: Reply<Vec<ElementInfo>>,
    },
    Screenshot {
        path: PathBuf,
        reply: Reply<()>,
    },

    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },

    // System
    Shutdown,
}

impl SessionCommand {
    pub fn name(&self) -> &'static str {
        match self {
            SessionCommand::Play { .. } => "play",
            SessionCommand::Stop { .. } => "stop",
            SessionCommand::SetStreamUrl { .. } => "set_stream_url",
            SessionCommand::SetTv { .. } => "set_tv",
            SessionCommand::Navigate { .. } => "navigate_url",
            SessionCommand::Click { .. } => "click_element",
            SessionCommand::Scroll { .. } => "scroll_page",
            SessionCommand::WaitFor { .. } => "wait_for_element",
            SessionCommand::ExecuteScript { .. } => "execute_script",
            SessionCommand::GetPageSource { .. } => "get_page_source",
            SessionCommand::GetCurrentUrl { .. } => "get_current_url",
            SessionCommand::GetElements { .. } => "get_elements",
            SessionCommand::Screenshot { .. } => "take_screenshot",
            SessionCommand::Snapshot { .. } => "snapshot",
            SessionCommand::Shutdown => "shutdown",
        }
    }
}

/// Events broadcast by a playback session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged {
        from: PlaybackState,
        to: PlaybackState,
    },
    MediaResolved {
        media_url: String,
        media_kind: MediaKind,
        strategy: Strategy,
    },
    Error {
        command: String,
        message: String,
    },
}
