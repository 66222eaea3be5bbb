//! Serial status-code messages
//!
//! Every message on the serial link is a newline-terminated JSON object
//! `{"status": <int>, "payload": <value>}`. The integer status is the
//! protocol's discriminant; the payload shape depends on it. Camera firmware
//! sometimes sends the payload as a JSON-encoded *string* containing the
//! actual object or array, so decoding normalizes both forms to one value.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use super::{ProtocolError, Transport};
use crate::config::CameraConfig;

/// Status codes used on the serial link
pub mod code {
    /// Camera is ready / probe echo (both directions)
    pub const READY: i64 = 1;
    /// Wi-Fi connect succeeded (payload: `{IPAddr}`)
    pub const WIFI_CONNECTED: i64 = 2;
    /// Wi-Fi connect failed
    pub const WIFI_FAILED: i64 = 3;
    /// Wi-Fi scan result (payload: array of networks)
    pub const WIFI_LIST: i64 = 4;
    /// Current camera config (payload: `{host,port,width,height,framerate}`);
    /// also the request code that asks for it
    pub const DEVICE_CONFIG: i64 = 5;
    /// Request a Wi-Fi scan
    pub const SCAN_REQUEST: i64 = 21;
    /// Request a Wi-Fi connect (payload: `{BSSID,pass}`)
    pub const CONNECT_REQUEST: i64 = 22;
    /// Announce the receiver's IP; the camera does not reply
    pub const ANNOUNCE_IP: i64 = 23;
}

/// Reply statuses a request may legitimately be answered with.
///
/// Empty means the request expects no reply at all.
pub fn expected_replies(request: i64) -> &'static [i64] {
    match request {
        code::READY => &[code::READY],
        code::DEVICE_CONFIG => &[code::DEVICE_CONFIG],
        code::SCAN_REQUEST => &[code::WIFI_LIST],
        code::CONNECT_REQUEST => &[code::WIFI_CONNECTED, code::WIFI_FAILED],
        _ => &[],
    }
}

/// One serial protocol message, request or reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusMessage {
    /// Protocol discriminant
    pub status: i64,
    /// Status-dependent payload; `null` when absent
    #[serde(default)]
    pub payload: Value,
}

impl StatusMessage {
    /// Request with a null payload
    pub fn request(status: i64) -> Self {
        Self {
            status,
            payload: Value::Null,
        }
    }

    /// Request carrying a payload
    pub fn with_payload(status: i64, payload: Value) -> Self {
        Self { status, payload }
    }

    /// Compact JSON followed by the protocol's newline terminator
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = serde_json::to_vec(self).unwrap_or_else(|_| b"{}".to_vec());
        bytes.push(b'\n');
        bytes
    }

    /// Parse a raw reply; the offending text is kept on failure
    pub fn decode(raw: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(raw).map_err(|_| ProtocolError::Parse {
            raw: String::from_utf8_lossy(raw).trim().to_string(),
        })
    }

    /// Payload with the string-encoding leniency applied.
    ///
    /// A payload that is itself a JSON-encoded string is parsed one level
    /// deep; anything unparseable, and `null`, becomes `None`.
    pub fn normalized_payload(&self) -> Option<Value> {
        match &self.payload {
            Value::Null => None,
            Value::String(inner) => serde_json::from_str(inner).ok(),
            other => Some(other.clone()),
        }
    }
}

/// Send one request and validate the reply status.
///
/// One attempt, bounded by `timeout`; an empty response is surfaced as
/// [`ProtocolError::Timeout`] since the wire cannot distinguish "slow" from
/// "gone". No automatic retry at this layer or anywhere above it.
pub fn exchange<T: Transport + ?Sized>(
    transport: &T,
    path: &str,
    request: &StatusMessage,
    timeout: Duration,
) -> Result<StatusMessage, ProtocolError> {
    let raw = transport.request(path, &request.encode(), timeout)?;
    if raw.is_empty() {
        return Err(ProtocolError::Timeout);
    }

    let reply = StatusMessage::decode(&raw)?;
    let expected = expected_replies(request.status);
    if !expected.contains(&reply.status) {
        return Err(ProtocolError::UnexpectedStatus {
            expected,
            actual: reply.status,
            raw: String::from_utf8_lossy(&raw).trim().to_string(),
        });
    }
    Ok(reply)
}

/// One network from a Wi-Fi scan reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiNetwork {
    /// Network name
    pub ssid: String,
    /// Access point identifier; what the connect request targets
    pub bssid: String,
    /// Signal strength in dBm (higher is better, e.g. -40 over -70)
    pub signal_dbm: i32,
}

impl WifiNetwork {
    /// Parse the status-4 payload (already normalized).
    ///
    /// Entries without SSID or BSSID are dropped, matching what the firmware
    /// can actually be connected to. Returns `None` if the payload is not an
    /// array at all.
    pub fn list_from_payload(payload: &Value) -> Option<Vec<WifiNetwork>> {
        let entries = payload.as_array()?;
        let mut networks = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(ssid) = entry.get("SSID").and_then(Value::as_str) else {
                continue;
            };
            let Some(bssid) = entry.get("BSSID").and_then(Value::as_str) else {
                continue;
            };
            if ssid.is_empty() || bssid.is_empty() {
                continue;
            }
            let signal_dbm = match entry.get("signal_dbm") {
                Some(v) => v
                    .as_i64()
                    .map(|s| s as i32)
                    .or_else(|| v.as_f64().map(|s| s as i32))
                    .unwrap_or(-70),
                // Firmware may omit signal strength on older builds
                None => -70,
            };
            networks.push(WifiNetwork {
                ssid: ssid.to_string(),
                bssid: bssid.to_string(),
                signal_dbm,
            });
        }
        Some(networks)
    }

    /// Sort strongest-first; ties keep their scan order
    pub fn sort_by_signal(networks: &mut [WifiNetwork]) {
        networks.sort_by_key(|n| std::cmp::Reverse(n.signal_dbm));
    }
}

/// Build the status-22 connect request
pub fn connect_request(bssid: &str, password: &str) -> StatusMessage {
    StatusMessage::with_payload(
        code::CONNECT_REQUEST,
        json!({ "BSSID": bssid, "pass": password }),
    )
}

/// Build the status-23 announce for the receiver's IP
pub fn announce_request(ip: &str) -> StatusMessage {
    StatusMessage::with_payload(code::ANNOUNCE_IP, json!({ "IPAddr": ip }))
}

/// Configuration snapshot carried by a status-5 reply.
///
/// All fields are optional; missing fields leave the local config untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeviceConfig {
    /// Stream destination host (the receiver, from the camera's view)
    pub host: Option<String>,
    /// Stream destination port
    pub port: Option<u16>,
    /// Frame width
    pub width: Option<u32>,
    /// Frame height
    pub height: Option<u32>,
    /// Frames per second
    pub framerate: Option<u32>,
}

impl DeviceConfig {
    /// Parse a normalized status-5 payload; `None` if it is not an object
    pub fn from_payload(payload: &Value) -> Option<Self> {
        if !payload.is_object() {
            return None;
        }
        serde_json::from_value(payload.clone()).ok()
    }

    /// Overlay the known fields onto a local config
    pub fn apply_to(&self, config: &mut CameraConfig) {
        if let Some(host) = &self.host {
            config.rx_host = host.clone();
        }
        if let Some(port) = self.port {
            config.rx_port = port;
        }
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(framerate) = self.framerate {
            config.framerate = framerate;
        }
    }
}
