//! Streamcast - cast the video behind a web page
//!
//! Host shell around the playback session: one-shot extraction, cast device
//! discovery, and an interactive line-oriented session.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use streamcast::browser::{BrowserController, ChromeDriver, ScrollDirection};
use streamcast::cast::{CastSink, ChromecastSink, LoggingSink};
use streamcast::extractor::{ExtractionCoordinator, StreamTarget};
use streamcast::session::{PlaybackSession, SessionActor, SessionEvent, SessionHandle};
use streamcast::utils::{get_settings_path, PlayerSettings};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "streamcast", version, about)]
struct Args {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve the media behind a page once and print it as JSON
    Extract {
        url: String,
        /// Skip the headless browser
        #[arg(long = "static")]
        static_only: bool,
    },
    /// List cast devices on the local network
    Discover {
        #[arg(long, default_value_t = 5)]
        timeout: u64,
    },
    /// Drive a playback session from commands on stdin
    Run {
        /// Log casts instead of contacting a device
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let settings_path = args.config.unwrap_or_else(get_settings_path);
    let settings = PlayerSettings::load_or_default(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;

    match args.command {
        Command::Extract { url, static_only } => extract(settings, url, static_only).await,
        Command::Discover { timeout } => discover(timeout).await,
        Command::Run { dry_run } => run(settings, dry_run).await,
    }
}

async fn extract(settings: PlayerSettings, url: String, static_only: bool) -> Result<()> {
    streamcast::utils::config::validate_stream_url(&url)?;
    let target = StreamTarget::from_settings(url, &settings).with_browser(settings.use_browser && !static_only);

    let coordinator = ExtractionCoordinator::from_settings(&settings);
    let driver = Arc::new(ChromeDriver::new(settings.browser.clone()));
    let mut browser = BrowserController::new(driver, settings.timeouts);

    let outcome = coordinator.resolve(&target, &mut browser).await;
    browser.quit().await;

    let result = outcome.context("Extraction failed")?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn discover(timeout: u64) -> Result<()> {
    let devices = ChromecastSink::new()
        .discover(Duration::from_secs(timeout))
        .await
        .context("Discovery failed")?;

    if devices.is_empty() {
        println!("No cast devices found");
    }
    for device in devices {
        println!("{}\t{}", device.device_ip, device.label());
    }
    Ok(())
}

async fn run(settings: PlayerSettings, dry_run: bool) -> Result<()> {
    let sink: Arc<dyn CastSink> = if dry_run {
        Arc::new(LoggingSink)
    } else {
        Arc::new(ChromecastSink::new())
    };
    let driver = Arc::new(ChromeDriver::new(settings.browser.clone()));
    let session = Arc::new(PlaybackSession::new(&settings, driver, sink));

    let mut events = session.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    println!("[events] {} event(s) dropped", missed);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            match event {
                SessionEvent::StateChanged { from, to } => println!("[state] {} -> {}", from, to),
                SessionEvent::MediaResolved {
                    media_url,
                    media_kind,
                    strategy,
                } => println!("[media] {} ({}, via {})", media_url, media_kind, strategy),
                SessionEvent::Error { command, message } => println!("[error] {}: {}", command, message),
            }
        }
    });

    let (actor, handle) = SessionActor::new(session);
    let actor_task = tokio::spawn(actor.run());

    println!("streamcast ready; type 'help' for commands");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            Ok(Line::Empty) => {}
            Ok(Line::Help) => println!("{}", HELP),
            Ok(Line::Quit) => break,
            Ok(Line::Command(cmd)) => {
                let handle = handle.clone();
                // Replies may arrive out of order.
                tokio::spawn(async move {
                    match dispatch(&handle, cmd).await {
                        Ok(reply) => println!("{}", reply),
                        Err(e) => println!("error: {}", e),
                    }
                });
            }
            Err(msg) => println!("error: {}", msg),
        }
    }

    handle.shutdown().await;
    actor_task.await.context("Session actor panicked")?;
    Ok(())
}

const HELP: &str = "commands: play | stop | url <u> | tv <ip> [name] | navigate <u> | click <sel> [secs] \
| scroll <down|up|top|bottom> | wait <sel> [secs] | script <js> | source | current | elements <sel> | screenshot <file> | status | quit";

#[derive(Debug, PartialEq)]
enum Line {
    Empty,
    Help,
    Quit,
    Command(ShellCommand),
}

#[derive(Debug, PartialEq)]
enum ShellCommand {
    Play,
    Stop,
    Url(String),
    Tv(String, Option<String>),
    Navigate(String),
    Click(String, Option<Duration>),
    Scroll(ScrollDirection),
    Wait(String, Option<Duration>),
    Script(String),
    Source,
    Current,
    Elements(String),
    Screenshot(PathBuf),
    Status,
}

fn parse_line(line: &str) -> std::result::Result<Line, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let required = |what: &str| {
        if rest.is_empty() {
            Err(format!("{} needs {}", word, what))
        } else {
            Ok(rest.to_string())
        }
    };

    let cmd = match word {
        "" => return Ok(Line::Empty),
        "help" => return Ok(Line::Help),
        "quit" | "exit" => return Ok(Line::Quit),
        "play" => ShellCommand::Play,
        "stop" => ShellCommand::Stop,
        "url" => ShellCommand::Url(required("a URL")?),
        "navigate" => ShellCommand::Navigate(required("a URL")?),
        "tv" => {
            let rest = required("an IP address")?;
            match rest.split_once(char::is_whitespace) {
                Some((ip, name)) => ShellCommand::Tv(ip.to_string(), Some(name.trim().to_string())),
                None => ShellCommand::Tv(rest, None),
            }
        }
        "click" | "wait" => {
            let (selector, timeout) = selector_and_timeout(&required("a selector")?)?;
            if word == "click" {
                ShellCommand::Click(selector, timeout)
            } else {
                ShellCommand::Wait(selector, timeout)
            }
        }
        "scroll" => ShellCommand::Scroll(required("a direction")?.parse().map_err(|e| format!("{}", e))?),
        "script" => ShellCommand::Script(required("JavaScript")?),
        "source" => ShellCommand::Source,
        "current" => ShellCommand::Current,
        "elements" => ShellCommand::Elements(required("a selector")?),
        "screenshot" => ShellCommand::Screenshot(PathBuf::from(required("a file path")?)),
        "status" => ShellCommand::Status,
        other => return Err(format!("unknown command: {}", other)),
    };
    Ok(Line::Command(cmd))
}

/// A trailing number is read as a timeout in seconds.
fn selector_and_timeout(rest: &str) -> std::result::Result<(String, Option<Duration>), String> {
    if let Some((selector, last)) = rest.rsplit_once(char::is_whitespace) {
        if let Ok(secs) = last.parse::<f64>() {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(format!("invalid timeout: {}", last));
            }
            return Ok((selector.trim().to_string(), Some(Duration::from_secs_f64(secs))));
        }
    }
    Ok((rest.to_string(), None))
}

async fn dispatch(handle: &SessionHandle, cmd: ShellCommand) -> streamcast::Result<String> {
    let done = || "ok".to_string();
    Ok(match cmd {
        ShellCommand::Play => handle.play().await.map(|_| done())?,
        ShellCommand::Stop => handle.stop().await.map(|_| done())?,
        ShellCommand::Url(url) => handle.set_stream_url(url).await.map(|_| done())?,
        ShellCommand::Tv(ip, name) => handle.set_tv(ip, name).await.map(|_| done())?,
        ShellCommand::Navigate(url) => handle.navigate_url(url).await.map(|_| done())?,
        ShellCommand::Click(selector, timeout) => handle.click_element(selector, timeout).await.map(|_| done())?,
        ShellCommand::Scroll(direction) => handle.scroll_page(direction).await.map(|_| done())?,
        ShellCommand::Wait(selector, timeout) => handle.wait_for_element(selector, timeout).await.map(|_| done())?,
        ShellCommand::Script(script) => handle.execute_script(script).await?.to_string(),
        ShellCommand::Source => handle.get_page_source().await?,
        ShellCommand::Current => handle
            .get_current_url()
            .await?
            .unwrap_or_else(|| "(no page)".to_string()),
        ShellCommand::Elements(selector) => {
            serde_json::to_string_pretty(&handle.get_elements(selector).await?)?
        }
        ShellCommand::Screenshot(path) => {
            let shown = path.display().to_string();
            handle.take_screenshot(path).await.map(|_| format!("saved {}", shown))?
        }
        ShellCommand::Status => serde_json::to_string_pretty(&handle.snapshot().await?)?,
    })
}
