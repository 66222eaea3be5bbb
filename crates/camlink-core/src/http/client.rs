//! Transmitter HTTP client
//!
//! The camera transmitter hosts a small HTTP control surface. Every call is
//! a single request with a bounded timeout; there are no retries and no
//! keep-alive assumptions. Failures are reported as `false`/`None` and
//! logged; nothing here aborts a caller.

use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::server::CONTROL_PORT;
use crate::config::CameraConfig;
use crate::protocol::message::{code, DeviceConfig, StatusMessage};

/// Timeout for lightweight calls (health, swap, rotate, status)
const LIGHT_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for the config push, which makes the transmitter reconfigure
const CONFIG_PUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Transmitter-side width/height handling for a rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapMode {
    /// 90°/270°: the transmitter must exchange width and height
    Swap,
    /// 0°/180°: dimensions stay as configured
    NoSwap,
}

impl SwapMode {
    /// Pure selection rule: odd rotations swap, even rotations don't
    pub fn for_rotate(rotate: u8) -> Self {
        if rotate % 2 == 0 {
            SwapMode::NoSwap
        } else {
            SwapMode::Swap
        }
    }

    /// Endpoint on the transmitter implementing this mode
    pub fn endpoint(self) -> &'static str {
        match self {
            SwapMode::Swap => "/swap",
            SwapMode::NoSwap => "/noswap",
        }
    }
}

/// Client for the transmitter's control surface and the local rotate callback
#[derive(Debug, Clone)]
pub struct HttpConfigClient {
    client: reqwest::Client,
}

impl HttpConfigClient {
    /// Build a client with this application's user agent
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent("camlink-rx/0.1")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    /// GET `/health`; true iff the body is JSON with `status == "healthy"`
    pub async fn health_check(&self, host: &str, port: u16) -> bool {
        let url = format!("http://{host}:{port}/health");
        debug!("health check: {url}");
        match self.client.get(&url).timeout(LIGHT_TIMEOUT).send().await {
            Ok(response) => match response.json::<Value>().await {
                Ok(body) => body.get("status").and_then(Value::as_str) == Some("healthy"),
                Err(err) => {
                    debug!("health check body not JSON: {err}");
                    false
                }
            },
            Err(err) => {
                debug!("health check failed: {err}");
                false
            }
        }
    }

    /// POST the stream config to `/config`.
    ///
    /// Any response body counts as success; the transmitter validates the
    /// config out-of-band. This asymmetry is part of the wire contract.
    pub async fn push_config(&self, host: &str, port: u16, config: &CameraConfig) -> bool {
        let url = format!("http://{host}:{port}/config");
        let body = json!({
            "host": config.rx_host,
            "port": config.rx_port,
            "width": config.width,
            "height": config.height,
            "framerate": config.framerate,
        });
        debug!("pushing config to {url}: {body}");

        match self
            .client
            .post(&url)
            .json(&body)
            .timeout(CONFIG_PUSH_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => match response.text().await {
                Ok(text) => {
                    debug!("config response: {text}");
                    true
                }
                Err(err) => {
                    warn!("config push got no body: {err}");
                    false
                }
            },
            Err(err) => {
                warn!("config push failed: {err}");
                false
            }
        }
    }

    /// POST the rotation to the receiver's own control endpoint on port 8889
    pub async fn push_rotate(&self, rx_host: &str, rotate: u8) -> bool {
        let url = format!("http://{rx_host}:{CONTROL_PORT}/rotate");
        match self
            .client
            .post(&url)
            .json(&json!({ "rotate": rotate }))
            .timeout(LIGHT_TIMEOUT)
            .send()
            .await
        {
            Ok(_) => true,
            Err(err) => {
                warn!("rotate POST failed: {err}");
                false
            }
        }
    }

    async fn send_swap(&self, host: &str, port: u16, mode: SwapMode) -> bool {
        let url = format!("http://{host}:{port}{}", mode.endpoint());
        debug!("requesting TX rotation mode at {url}");
        match self.client.post(&url).timeout(LIGHT_TIMEOUT).send().await {
            Ok(response) if response.status() == reqwest::StatusCode::OK => true,
            Ok(response) => {
                warn!("TX rotation request got HTTP {}", response.status());
                false
            }
            Err(err) => {
                warn!("TX rotation request failed: {err}");
                false
            }
        }
    }

    /// POST `/swap`; success iff HTTP 200
    pub async fn request_swap(&self, host: &str, port: u16) -> bool {
        self.send_swap(host, port, SwapMode::Swap).await
    }

    /// POST `/noswap`; success iff HTTP 200
    pub async fn request_noswap(&self, host: &str, port: u16) -> bool {
        self.send_swap(host, port, SwapMode::NoSwap).await
    }

    /// Ask the transmitter for the mode matching `rotate` before streaming
    pub async fn apply_rotation_swap(&self, host: &str, port: u16, rotate: u8) -> bool {
        self.send_swap(host, port, SwapMode::for_rotate(rotate)).await
    }

    /// Announce the receiver's IP over HTTP (`/status`, status 23)
    pub async fn announce_ip(&self, host: &str, port: u16, ip: &str) -> bool {
        let url = format!("http://{host}:{port}/status");
        let body = json!({ "status": code::ANNOUNCE_IP, "payload": { "IPAddr": ip } });
        match self
            .client
            .post(&url)
            .json(&body)
            .timeout(LIGHT_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                warn!("IP announce failed: {err}");
                false
            }
        }
    }

    /// Pull the transmitter's config (`/status`, status 5).
    ///
    /// The reply mirrors the serial status-5 message, including the
    /// payload-as-string leniency. Returns the parsed snapshot together with
    /// the normalized payload for persistence, or `None` on any failure.
    pub async fn pull_remote_config(
        &self,
        host: &str,
        port: u16,
    ) -> Option<(DeviceConfig, Value)> {
        let url = format!("http://{host}:{port}/status");
        let body = json!({ "status": code::DEVICE_CONFIG });
        let response = match self
            .client
            .post(&url)
            .json(&body)
            .timeout(LIGHT_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                debug!("remote config pull failed: {err}");
                return None;
            }
        };

        let message = match response.json::<StatusMessage>().await {
            Ok(message) => message,
            Err(err) => {
                debug!("remote config reply not a status message: {err}");
                return None;
            }
        };
        if message.status != code::DEVICE_CONFIG {
            debug!("remote config reply has status {}", message.status);
            return None;
        }

        let payload = message.normalized_payload()?;
        let remote = DeviceConfig::from_payload(&payload)?;
        Some((remote, payload))
    }
}

impl Default for HttpConfigClient {
    fn default() -> Self {
        Self::new()
    }
}
