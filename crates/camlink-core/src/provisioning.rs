//! Provisioning coordinator
//!
//! Drives the end-to-end setup of a camera: a previously discovered serial
//! port feeds a Wi-Fi scan, the user picks a network and supplies a
//! credential, the camera joins the network and reports its IP, the receiver
//! announces its own address back and pulls the transmitter's config over
//! HTTP, and the outcome is persisted.
//!
//! Steps are strictly sequential; the first failure aborts the rest and is
//! surfaced with a specific error. At most one flow runs at a time — a
//! second caller is rejected immediately rather than queued — and every
//! network operation runs off the caller's thread.

use serde_json::{json, Value};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::SharedConfig;
use crate::events::{ControlEvent, EventSender};
use crate::http::HttpConfigClient;
use crate::net;
use crate::protocol::message::{self, code};
use crate::protocol::{
    exchange, DeviceConfig, DeviceGate, ProtocolError, SerialTransport, StatusMessage, Transport,
    WifiNetwork, CONFIG_TIMEOUT_MS, CONNECT_TIMEOUT_MS, SCAN_TIMEOUT_MS,
};
use crate::store::{ProvisioningRecord, RecordStore};

/// Why a provisioning step could not complete
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("A provisioning operation is already running")]
    Busy,

    #[error("No camera port discovered yet")]
    NoPort,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The camera explicitly refused the connect (status 3); the reply is
    /// surfaced verbatim and the user must re-attempt
    #[error("Camera rejected the Wi-Fi connect: {reply}")]
    ConnectRejected {
        /// Raw reply for diagnostics
        reply: String,
    },

    #[error("Connect reply did not include an IP address: {reply}")]
    MissingIp {
        /// Raw reply for diagnostics
        reply: String,
    },

    #[error("Transmitter health check failed")]
    TransmitterUnreachable,

    #[error("Transmitter did not accept the configuration")]
    ConfigPushFailed,
}

/// How far a configuration push got
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigPush {
    /// Transmitter configured and the local rotate callback delivered
    Applied,
    /// Transmitter configured, but the rotate callback to the local control
    /// peer failed; the primary operation succeeded so this is not an error
    AppliedWithoutRotateCallback,
}

/// Orchestrates discovery results, the serial protocol, the HTTP client and
/// the persisted record
pub struct ProvisioningCoordinator<T: Transport = SerialTransport> {
    transport: Arc<T>,
    gate: DeviceGate,
    config: SharedConfig,
    http: HttpConfigClient,
    store: RecordStore,
    events: EventSender,
    port: Mutex<Option<String>>,
    local_ip_override: Option<IpAddr>,
}

impl<T: Transport> ProvisioningCoordinator<T> {
    /// Wire up a coordinator; `gate` must be the one discovery also uses
    pub fn new(
        transport: Arc<T>,
        gate: DeviceGate,
        config: SharedConfig,
        http: HttpConfigClient,
        store: RecordStore,
        events: EventSender,
    ) -> Self {
        Self {
            transport,
            gate,
            config,
            http,
            store,
            events,
            port: Mutex::new(None),
            local_ip_override: None,
        }
    }

    /// Announce this address instead of asking the OS for one; useful on
    /// multi-homed hosts
    pub fn with_local_ip(mut self, ip: IpAddr) -> Self {
        self.local_ip_override = Some(ip);
        self
    }

    /// Adopt a discovery result; provisioning is refused until one exists
    pub async fn set_port(&self, port: impl Into<String>) {
        *self.port.lock().await = Some(port.into());
    }

    /// Forget the current port (camera unplugged)
    pub async fn clear_port(&self) {
        *self.port.lock().await = None;
    }

    /// The port provisioning will use, if any
    pub async fn port(&self) -> Option<String> {
        self.port.lock().await.clone()
    }

    /// The record store this coordinator persists into
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Whether the persisted record already covers the camera we are
    /// currently pointed at; false suggests running setup again
    pub async fn record_matches_camera(&self) -> bool {
        let tx_host = self.config.lock().await.tx_host.clone();
        self.store.matches_ip(&tx_host)
    }

    /// Ask the camera for visible Wi-Fi networks (status 21 → 4).
    ///
    /// The returned list is sorted strongest-first, ties keeping the
    /// camera's scan order, and is also emitted as an event.
    pub async fn scan_networks(&self) -> Result<Vec<WifiNetwork>, ProvisionError> {
        let result = self.scan_networks_inner().await;
        if let Err(err) = &result {
            self.events
                .emit(ControlEvent::ProvisioningFailed(err.to_string()));
        }
        result
    }

    async fn scan_networks_inner(&self) -> Result<Vec<WifiNetwork>, ProvisionError> {
        let _guard = self.gate.try_acquire().ok_or(ProvisionError::Busy)?;
        let port = self.port().await.ok_or(ProvisionError::NoPort)?;

        info!("requesting Wi-Fi scan on {port}");
        let request = StatusMessage::request(code::SCAN_REQUEST);
        let reply = self
            .blocking_exchange(&port, request, SCAN_TIMEOUT_MS)
            .await?;

        let payload = reply
            .normalized_payload()
            .ok_or(ProtocolError::MissingField("payload"))?;
        let mut networks = WifiNetwork::list_from_payload(&payload)
            .ok_or(ProtocolError::MissingField("payload"))?;
        WifiNetwork::sort_by_signal(&mut networks);

        info!("Wi-Fi scan found {} networks", networks.len());
        self.events
            .emit(ControlEvent::WifiNetworks(networks.clone()));
        Ok(networks)
    }

    /// Join the camera to a network and record the outcome (status 22 → 2/3,
    /// then IP announce, config pull and persistence).
    ///
    /// On success returns the transmitter's IP. A record is persisted for
    /// every successful connect, with an empty `tx` object when the config
    /// pull was unreachable.
    pub async fn connect_network(
        &self,
        bssid: &str,
        password: &str,
    ) -> Result<String, ProvisionError> {
        let result = self.connect_network_inner(bssid, password).await;
        if let Err(err) = &result {
            self.events
                .emit(ControlEvent::ProvisioningFailed(err.to_string()));
        }
        result
    }

    async fn connect_network_inner(
        &self,
        bssid: &str,
        password: &str,
    ) -> Result<String, ProvisionError> {
        let _guard = self.gate.try_acquire().ok_or(ProvisionError::Busy)?;
        let port = self.port().await.ok_or(ProvisionError::NoPort)?;

        info!("sending Wi-Fi connect for BSSID {bssid}");
        let request = message::connect_request(bssid, password);
        let reply = self
            .blocking_exchange(&port, request, CONNECT_TIMEOUT_MS)
            .await?;

        if reply.status == code::WIFI_FAILED {
            return Err(ProvisionError::ConnectRejected {
                reply: raw_of(&reply),
            });
        }

        let camera_ip = reply
            .normalized_payload()
            .and_then(|p| p.get("IPAddr").and_then(Value::as_str).map(String::from))
            .filter(|ip| !ip.is_empty())
            .ok_or_else(|| ProvisionError::MissingIp {
                reply: raw_of(&reply),
            })?;
        info!("Wi-Fi connect succeeded, camera at {camera_ip}");

        {
            let mut config = self.config.lock().await;
            config.tx_host = camera_ip.clone();
        }

        self.announce_local_ip(&port).await;

        // Pull the transmitter config over HTTP; the record is written even
        // when this does not work out
        let (tx_host, tx_port) = {
            let config = self.config.lock().await;
            (config.tx_host.clone(), config.tx_port)
        };
        let mut tx_blob = json!({});
        match self.http.pull_remote_config(&tx_host, tx_port).await {
            Some((remote, payload)) => {
                let mut config = self.config.lock().await;
                remote.apply_to(&mut config);
                tx_blob = payload;
                info!("pulled transmitter config after connect");
            }
            None => info!("transmitter config pull failed; recording IP only"),
        }

        let record = ProvisioningRecord::new(camera_ip.clone(), tx_blob);
        if let Err(err) = self.store.save(&record) {
            warn!("failed to persist provisioning record: {err}");
        }

        self.events.emit(ControlEvent::Provisioned {
            camera_ip: camera_ip.clone(),
        });
        Ok(camera_ip)
    }

    /// Pull the camera's config over serial (status 5) and overlay the
    /// known fields onto the shared config; unknown fields stay as they are
    pub async fn refresh_config_from_camera(&self) -> Result<DeviceConfig, ProvisionError> {
        let _guard = self.gate.try_acquire().ok_or(ProvisionError::Busy)?;
        let port = self.port().await.ok_or(ProvisionError::NoPort)?;

        let request = StatusMessage::request(code::DEVICE_CONFIG);
        let reply = self
            .blocking_exchange(&port, request, CONFIG_TIMEOUT_MS)
            .await?;

        let payload = reply
            .normalized_payload()
            .ok_or(ProtocolError::MissingField("payload"))?;
        let remote = DeviceConfig::from_payload(&payload)
            .ok_or(ProtocolError::MissingField("payload"))?;
        {
            let mut config = self.config.lock().await;
            remote.apply_to(&mut config);
        }
        info!("refreshed config from camera over serial");
        Ok(remote)
    }

    /// Push the current configuration to the transmitter, then mirror the
    /// rotation to the local control peer.
    ///
    /// An unreachable or refusing transmitter aborts; a failed rotate
    /// callback does not, because the config push already succeeded — the
    /// partial outcome is reported instead.
    pub async fn apply_config(&self) -> Result<ConfigPush, ProvisionError> {
        let (config, tx_host, tx_port, rx_host, rotate) = {
            let config = self.config.lock().await;
            (
                config.clone(),
                config.tx_host.clone(),
                config.tx_port,
                config.rx_host.clone(),
                config.rotate,
            )
        };

        if !self.http.health_check(&tx_host, tx_port).await {
            return Err(ProvisionError::TransmitterUnreachable);
        }
        if !self.http.push_config(&tx_host, tx_port, &config).await {
            return Err(ProvisionError::ConfigPushFailed);
        }
        if !self.http.push_rotate(&rx_host, rotate).await {
            warn!("rotate callback to local peer failed; configuration already pushed");
            return Ok(ConfigPush::AppliedWithoutRotateCallback);
        }
        Ok(ConfigPush::Applied)
    }

    /// Best-effort status-23 announce; no reply is expected and failures are
    /// only logged
    async fn announce_local_ip(&self, port: &str) {
        let ip = self
            .local_ip_override
            .or_else(net::local_ip)
            .map(|ip| ip.to_string());
        let Some(ip) = ip else {
            warn!("no local IP available to announce to the camera");
            return;
        };

        let bytes = message::announce_request(&ip).encode();
        let transport = Arc::clone(&self.transport);
        let port = port.to_string();
        match tokio::task::spawn_blocking(move || transport.send_only(&port, &bytes)).await {
            Ok(Ok(())) => debug!("announced local IP {ip} to camera"),
            Ok(Err(err)) => warn!("IP announce failed: {err}"),
            Err(err) => warn!("IP announce task failed: {err}"),
        }
    }

    async fn blocking_exchange(
        &self,
        port: &str,
        request: StatusMessage,
        timeout_ms: u64,
    ) -> Result<StatusMessage, ProtocolError> {
        let transport = Arc::clone(&self.transport);
        let port = port.to_string();
        tokio::task::spawn_blocking(move || {
            exchange(
                transport.as_ref(),
                &port,
                &request,
                Duration::from_millis(timeout_ms),
            )
        })
        .await
        .map_err(|err| ProtocolError::Serial(format!("serial task failed: {err}")))?
    }
}

fn raw_of(reply: &StatusMessage) -> String {
    serde_json::to_string(reply).unwrap_or_default()
}
