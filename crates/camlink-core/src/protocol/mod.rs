//! Serial Device Link Protocol
//!
//! Implements discovery of the camera's serial port and the JSON status-code
//! protocol spoken over it (readiness, Wi-Fi scan/connect, config pull, IP
//! announce).

pub mod discovery;
mod error;
pub mod message;
pub mod serial;

pub use discovery::{candidate_ports, find_camera_port, DiscoveryService, SerialPortCandidate};
pub use error::ProtocolError;
pub use message::{exchange, DeviceConfig, StatusMessage, WifiNetwork};
pub use serial::{DeviceGate, DeviceGuard, SerialTransport, Transport};

/// Baud rate the camera link always runs at
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Read budget for a discovery probe in milliseconds
pub const PROBE_TIMEOUT_MS: u64 = 400;

/// Read budget for a config pull (status 5) in milliseconds
pub const CONFIG_TIMEOUT_MS: u64 = 4_000;

/// Read budget for a Wi-Fi scan (status 21) in milliseconds; scanning is the
/// slowest thing the camera does
pub const SCAN_TIMEOUT_MS: u64 = 10_000;

/// Read budget for a Wi-Fi connect (status 22) in milliseconds
pub const CONNECT_TIMEOUT_MS: u64 = 10_000;
