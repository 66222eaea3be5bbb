//! # CamLink Core Library
//!
//! Control plane for the CamLink camera receiver.
//!
//! This library provides:
//! - Serial port discovery and probing for the camera link
//! - The JSON status-code protocol spoken over serial (readiness, Wi-Fi
//!   scan/connect, config pull, IP announce)
//! - The HTTP client for the transmitter's control surface
//! - The locally hosted rotation callback endpoint
//! - The coordinator tying discovery, provisioning and persistence together
//!
//! The graphical shell and the video pipeline are external collaborators:
//! the first consumes [`events::ControlEvent`]s, the second holds the
//! receiving end of a [`pipeline::PipelineHandle`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use camlink_core::prelude::*;
//! use std::sync::Arc;
//!
//! let transport = Arc::new(SerialTransport::new());
//! let gate = DeviceGate::new();
//! let (events, mut rx) = EventSender::channel();
//!
//! let discovery = DiscoveryService::new(transport.clone(), gate.clone(), events.clone());
//! if let Some(port) = discovery.scan().await {
//!     coordinator.set_port(port.path).await;
//!     let networks = coordinator.scan_networks().await?;
//! }
//! ```

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod auth;
pub mod config;
pub mod events;
pub mod http;
pub mod net;
pub mod pipeline;
pub mod protocol;
pub mod provisioning;
pub mod store;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::auth::OperatorCredentials;
    pub use crate::config::{shared, CameraConfig, SharedConfig};
    pub use crate::events::{ControlEvent, EventSender};
    pub use crate::http::{ControlState, HttpConfigClient, SwapMode, CONTROL_PORT};
    pub use crate::pipeline::{PipelineCommand, PipelineHandle};
    pub use crate::protocol::{
        DeviceGate, DiscoveryService, ProtocolError, SerialPortCandidate, SerialTransport,
        StatusMessage, Transport, WifiNetwork,
    };
    pub use crate::provisioning::{ConfigPush, ProvisionError, ProvisioningCoordinator};
    pub use crate::store::{ProvisioningRecord, RecordStore};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
