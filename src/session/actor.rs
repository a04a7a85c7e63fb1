use super::machine::PlaybackSession;
use super::messages::{Reply, SessionCommand};
use super::state::SessionSnapshot;
use crate::browser::{ElementInfo, ScrollDirection};
use crate::utils::error::{Result, StreamcastError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

const COMMAND_CAPACITY: usize = 32;

/// Runs commands from a host shell against one `PlaybackSession`.
///
/// Each command runs on its own task so `stop()` and `set_stream_url()` can
/// overtake a slow extraction; the session itself serializes browser work.
pub struct SessionActor {
    receiver: mpsc::Receiver<SessionCommand>,
    session: Arc<PlaybackSession>,
}

impl SessionActor {
    pub fn new(session: Arc<PlaybackSession>) -> (Self, SessionHandle) {
        let (sender, receiver) = mpsc::channel(COMMAND_CAPACITY);
        (Self { receiver, session }, SessionHandle { sender })
    }

    pub async fn run(mut self) {
        info!("SessionActor started for {}", self.session.name());

        while let Some(cmd) = self.receiver.recv().await {
            debug!("Received command: {}", cmd.name());
            match cmd {
                SessionCommand::Shutdown => {
                    info!("SessionActor shutting down");
                    self.session.shutdown().await;
                    break;
                }
                SessionCommand::Snapshot { reply } => {
                    let _ = reply.send(self.session.snapshot().await);
                }
                cmd => {
                    let session = self.session.clone();
                    tokio::spawn(async move {
                        Self::handle(session, cmd).await;
                    });
                }
            }
        }
    }

    async fn handle(session: Arc<PlaybackSession>, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Play { reply } => {
                let _ = reply.send(session.play().await);
            }
            SessionCommand::Stop { reply } => {
                let _ = reply.send(session.stop().await);
            }
            SessionCommand::SetStreamUrl { url, reply } => {
                let _ = reply.send(session.set_stream_url(&url).await);
            }
            SessionCommand::SetTv { ip, name, reply } => {
                let _ = reply.send(session.set_tv(&ip, name).await);
            }
            SessionCommand::Navigate { url, reply } => {
                let _ = reply.send(session.navigate_url(&url).await);
            }
            SessionCommand::Click {
                selector,
                timeout,
                reply,
            } => {
                let _ = reply.send(session.click_element(&selector, timeout).await);
            }
            SessionCommand::Scroll { direction, reply } => {
                let _ = reply.send(session.scroll_page(direction).await);
            }
            SessionCommand::WaitFor {
                selector,
                timeout,
                reply,
            } => {
                let _ = reply.send(session.wait_for_element(&selector, timeout).await);
            }
            SessionCommand::ExecuteScript { script, reply } => {
                let _ = reply.send(session.execute_script(&script).await);
            }
            SessionCommand::GetPageSource { reply } => {
                let _ = reply.send(session.get_page_source().await);
            }
            SessionCommand::GetCurrentUrl { reply } => {
                let _ = reply.send(session.get_current_url().await);
            }
            SessionCommand::GetElements { selector, reply } => {
                let _ = reply.send(session.get_elements(&selector).await);
            }
            SessionCommand::Screenshot { path, reply } => {
                let _ = reply.send(session.take_screenshot(&path).await);
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(session.snapshot().await);
            }
            SessionCommand::Shutdown => {}
        }
    }
}

/// Cloneable sender side of a `SessionActor`
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> SessionCommand) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(build(reply))
            .await
            .map_err(|_| actor_gone())?;
        response.await.map_err(|_| actor_gone())?
    }

    pub async fn play(&self) -> Result<()> {
        self.request(|reply| SessionCommand::Play { reply }).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.request(|reply| SessionCommand::Stop { reply }).await
    }

    pub async fn set_stream_url(&self, url: impl Into<String>) -> Result<()> {
        let url = url.into();
        self.request(|reply| SessionCommand::SetStreamUrl { url, reply }).await
    }

    pub async fn set_tv(&self, ip: impl Into<String>, name: Option<String>) -> Result<()> {
        let ip = ip.into();
        self.request(|reply| SessionCommand::SetTv { ip, name, reply }).await
    }

    pub async fn navigate_url(&self, url: impl Into<String>) -> Result<()> {
        let url = url.into();
        self.request(|reply| SessionCommand::Navigate { url, reply }).await
    }

    pub async fn click_element(&self, selector: impl Into<String>, timeout: Option<Duration>) -> Result<()> {
        let selector = selector.into();
        self.request(|reply| SessionCommand::Click {
            selector,
            timeout,
            reply,
        })
        .await
    }

    pub async fn scroll_page(&self, direction: ScrollDirection) -> Result<()> {
        self.request(|reply| SessionCommand::Scroll { direction, reply }).await
    }

    pub async fn wait_for_element(&self, selector: impl Into<String>, timeout: Option<Duration>) -> Result<()> {
        let selector = selector.into();
        self.request(|reply| SessionCommand::WaitFor {
            selector,
            timeout,
            reply,
        })
        .await
    }

    pub async fn execute_script(&self, script: impl Into<String>) -> Result<serde_json::Value> {
        let script = script.into();
        self.request(|reply| SessionCommand::ExecuteScript { script, reply }).await
    }

    pub async fn get_page_source(&self) -> Result<String> {
        self.request(|reply| SessionCommand::GetPageSource { reply }).await
    }

    pub async fn get_current_url(&self) -> Result<Option<String>> {
        self.request(|reply| SessionCommand::GetCurrentUrl { reply }).await
    }

    pub async fn get_elements(&self, selector: impl Into<String>) -> Result<Vec<ElementInfo>> {
        let selector = selector.into();
        self.request(|reply| SessionCommand::GetElements { selector, reply }).await
    }

    pub async fn take_screenshot(&self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        self.request(|reply| SessionCommand::Screenshot { path, reply }).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(SessionCommand::Snapshot { reply })
            .await
            .map_err(|_| actor_gone())?;
        response.await.map_err(|_| actor_gone())
    }

    /// Ask the actor to stop the session and exit its loop.
    pub async fn shutdown(&self) {
        let _ = self.sender.send(SessionCommand::Shutdown).await;
    }
}

fn actor_gone() -> StreamcastError {
    StreamcastError::InvalidState {
        state: "shut down".to_string(),
        command: "session command".to_string(),
    }
}
