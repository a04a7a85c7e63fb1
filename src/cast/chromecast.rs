//! Chromecast sink
//!
//! Device discovery via mDNS and media loading over CASTV2 with the
//! rust_cast library. Both libraries block, so every call runs on the
//! blocking thread pool with a fresh connection.
//!
//! A target with a friendly name is looked up by that name first, so a
//! device that changed address on DHCP is still reached. The configured
//! IP is used when the name does not answer.

use crate::cast::{CastSink, CastTarget};
use crate::extractor::models::MediaKind;
use crate::utils::error::{Result, StreamcastError};
use anyhow::Context;
use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent};
use rust_cast::channels::media::{Media, StreamType};
use rust_cast::channels::receiver::CastDeviceApp;
use rust_cast::CastDevice;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Service name for Chromecast mDNS discovery
const CHROMECAST_SERVICE_TYPE: &str = "_googlecast._tcp.local.";

/// Default Chromecast port
pub const DEFAULT_CAST_PORT: u16 = 8009;

/// How long to browse for a device by name before using its configured IP
const NAME_LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct ChromecastSink {
    port: u16,
    name_lookup: Option<Duration>,
}

impl Default for ChromecastSink {
    fn default() -> Self {
        Self {
            port: DEFAULT_CAST_PORT,
            name_lookup: Some(NAME_LOOKUP_TIMEOUT),
        }
    }
}

impl ChromecastSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    /// Always connect to the configured IP.
    pub fn without_name_lookup(mut self) -> Self {
        self.name_lookup = None;
        self
    }

    async fn resolve_host(&self, target: &CastTarget) -> String {
        let (Some(name), Some(limit)) = (target.device_name.clone(), self.name_lookup) else {
            return target.device_ip.clone();
        };

        let lookup = tokio::task::spawn_blocking(move || {
            browse_blocking(limit, |found| names_match(found, &name))
        })
        .await;

        match lookup {
            Ok(Ok(found)) => {
                let host = pick_address(&found, target);
                if host != target.device_ip {
                    info!("{} answered at {} instead of {}", target.label(), host, target.device_ip);
                }
                host
            }
            Ok(Err(e)) => {
                warn!("Name lookup for {} failed: {:#}", target.label(), e);
                target.device_ip.clone()
            }
            Err(e) => {
                warn!("Name lookup task for {} failed: {}", target.label(), e);
                target.device_ip.clone()
            }
        }
    }
}

fn names_match(device: &CastTarget, name: &str) -> bool {
    device
        .device_name
        .as_deref()
        .is_some_and(|found| found.trim().eq_ignore_ascii_case(name.trim()))
}

/// Address of the discovered device carrying the target's name, or the
/// target's own IP when none does.
pub fn pick_address(found: &[CastTarget], target: &CastTarget) -> String {
    let Some(name) = target.device_name.as_deref() else {
        return target.device_ip.clone();
    };
    found
        .iter()
        .find(|device| names_match(device, name))
        .map(|device| device.device_ip.clone())
        .unwrap_or_else(|| target.device_ip.clone())
}

#[async_trait]
impl CastSink for ChromecastSink {
    fn id(&self) -> &'static str {
        "chromecast"
    }

    async fn push(&self, media_url: &str, media_kind: MediaKind, target: &CastTarget) -> Result<()> {
        if !target.is_configured() {
            return Err(StreamcastError::Cast("no cast device configured".to_string()));
        }

        let host = self.resolve_host(target).await;
        let port = self.port;
        let url = media_url.to_string();
        let content_type = media_kind.mime_hint(media_url).to_string();
        let stream_type = match media_kind {
            MediaKind::HlsStream => StreamType::Live,
            _ => StreamType::Buffered,
        };

        info!("Casting {} ({}) to {}", url, content_type, target.label());
        tokio::task::spawn_blocking(move || load_media_blocking(&host, port, &url, &content_type, stream_type))
            .await
            .map_err(|e| StreamcastError::Cast(format!("cast task failed: {}", e)))?
            .map_err(|e| StreamcastError::Cast(format!("{:#}", e)))
    }

    async fn stop(&self, target: &CastTarget) -> Result<()> {
        if !target.is_configured() {
            return Ok(());
        }

        let host = self.resolve_host(target).await;
        let port = self.port;
        debug!("Stopping playback on {}", target.label());
        tokio::task::spawn_blocking(move || stop_blocking(&host, port))
            .await
            .map_err(|e| StreamcastError::Cast(format!("cast task failed: {}", e)))?
            .map_err(|e| StreamcastError::Cast(format!("{:#}", e)))
    }

    async fn discover(&self, timeout: Duration) -> Result<Vec<CastTarget>> {
        tokio::task::spawn_blocking(move || browse_blocking(timeout, |_| false))
            .await
            .map_err(|e| StreamcastError::Cast(format!("discovery task failed: {}", e)))?
            .map_err(|e| StreamcastError::Cast(format!("{:#}", e)))
    }
}

/// Launch the default media receiver and load the URL (blocking)
fn load_media_blocking(
    host: &str,
    port: u16,
    media_url: &str,
    content_type: &str,
    stream_type: StreamType,
) -> anyhow::Result<()> {
    let device = CastDevice::connect_without_host_verification(host, port)
        .with_context(|| format!("Failed to connect to cast device {}:{}", host, port))?;

    device
        .connection
        .connect("receiver-0")
        .context("Failed to connect to receiver")?;

    let app = device
        .receiver
        .launch_app(&CastDeviceApp::DefaultMediaReceiver)
        .context("Failed to launch media receiver")?;

    device
        .connection
        .connect(app.transport_id.clone())
        .context("Failed to connect to media app")?;

    let media = Media {
        content_id: media_url.to_string(),
        content_type: content_type.to_string(),
        stream_type,
        duration: None,
        metadata: None,
    };

    device
        .media
        .load(app.transport_id.clone(), app.session_id.clone(), &media)
        .context("Failed to load media")?;

    info!("Media loaded on {}", host);
    Ok(())
}

/// Stop the running receiver application, if any (blocking)
fn stop_blocking(host: &str, port: u16) -> anyhow::Result<()> {
    let device = CastDevice::connect_without_host_verification(host, port)
        .with_context(|| format!("Failed to connect to cast device {}:{}", host, port))?;

    device
        .connection
        .connect("receiver-0")
        .context("Failed to connect to receiver")?;

    let status = device.receiver.get_status().context("Failed to read receiver status")?;
    match status.applications.first() {
        Some(app) => {
            device
                .receiver
                .stop_app(app.session_id.clone())
                .context("Failed to stop receiver application")?;
            info!("Stopped receiver session {} on {}", app.session_id, host);
        }
        None => debug!("Nothing running on {}", host),
    }
    Ok(())
}

/// Browse for cast devices until `timeout` elapses or `done` accepts a
/// newly found device (blocking)
fn browse_blocking(timeout: Duration, done: impl Fn(&CastTarget) -> bool) -> anyhow::Result<Vec<CastTarget>> {
    let mdns = ServiceDaemon::new().context("Failed to create mDNS daemon")?;
    let receiver = mdns
        .browse(CHROMECAST_SERVICE_TYPE)
        .context("Failed to browse for Chromecast devices")?;

    let deadline = Instant::now() + timeout;
    let mut devices: Vec<CastTarget> = Vec::new();

    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        let event = match receiver.recv_timeout(remaining) {
            Ok(event) => event,
            Err(_) => break,
        };
        let ServiceEvent::ServiceResolved(info) = event else {
            continue;
        };

        let name = info
            .get_property_val_str("fn")
            .unwrap_or_else(|| info.get_fullname())
            .to_string();

        let mut finished = false;
        for addr in info.get_addresses() {
            let ip: IpAddr = (*addr).into();
            if !ip.is_ipv4() {
                continue;
            }
            let ip = ip.to_string();
            if !devices.iter().any(|d| d.device_ip == ip) {
                debug!("Discovered cast device {} at {}", name, ip);
                let device = CastTarget {
                    device_ip: ip,
                    device_name: Some(name.clone()),
                };
                finished |= done(&device);
                devices.push(device);
            }
        }
        if finished {
            break;
        }
    }

    if let Err(e) = mdns.stop_browse(CHROMECAST_SERVICE_TYPE) {
        warn!("Failed to stop mDNS browse: {}", e);
    }
    let _ = mdns.shutdown();

    info!("Discovered {} cast device(s)", devices.len());
    Ok(devices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_without_device_is_cast_error() {
        let sink = ChromecastSink::new();
        let err = sink
            .push("https://cdn.test/a.mp4", MediaKind::DirectVideo, &CastTarget::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StreamcastError::Cast(_)));
    }

    #[tokio::test]
    async fn test_stop_without_device_is_noop() {
        assert!(ChromecastSink::new().stop(&CastTarget::default()).await.is_ok());
    }

    fn device(ip: &str, name: &str) -> CastTarget {
        CastTarget {
            device_ip: ip.to_string(),
            device_name: Some(name.to_string()),
        }
    }

    #[test]
    fn test_pick_address_prefers_device_found_by_name() {
        let found = vec![device("192.168.1.20", "Kitchen"), device("192.168.1.77", "Living Room ")];
        let target = device("192.168.1.50", "living room");
        assert_eq!(pick_address(&found, &target), "192.168.1.77");
    }

    #[test]
    fn test_pick_address_falls_back_to_configured_ip() {
        let found = vec![device("192.168.1.20", "Kitchen")];
        assert_eq!(pick_address(&found, &device("192.168.1.50", "Bedroom")), "192.168.1.50");
        assert_eq!(pick_address(&[], &device("192.168.1.50", "Bedroom")), "192.168.1.50");

        let unnamed = CastTarget {
            device_ip: "192.168.1.50".to_string(),
            device_name: None,
        };
        assert_eq!(pick_address(&found, &unnamed), "192.168.1.50");
    }

    #[tokio::test]
    async fn test_unnamed_target_skips_lookup() {
        let target = CastTarget {
            device_ip: "192.168.1.50".to_string(),
            device_name: None,
        };
        assert_eq!(ChromecastSink::new().resolve_host(&target).await, "192.168.1.50");

        let named = device("192.168.1.50", "Bedroom");
        let sink = ChromecastSink::new().without_name_lookup();
        assert_eq!(sink.resolve_host(&named).await, "192.168.1.50");
    }
}
