//! Control-plane events
//!
//! Background tasks never call back into the embedding application directly;
//! every user-facing outcome is posted as an event on an unbounded channel
//! the owning context drains at its leisure. Emitting never blocks, and a
//! dropped receiver just discards events.

use tokio::sync::mpsc;
use tracing::trace;

use crate::protocol::{SerialPortCandidate, WifiNetwork};

/// Outcomes surfaced to the embedding application
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    /// A discovery scan finished; `None` means no camera answered
    PortScan(Option<SerialPortCandidate>),
    /// A Wi-Fi scan returned these networks (already sorted by signal)
    WifiNetworks(Vec<WifiNetwork>),
    /// Provisioning completed; the camera is reachable at this address
    Provisioned {
        /// Transmitter IP from the connect reply
        camera_ip: String,
    },
    /// A provisioning step failed; the flow was aborted
    ProvisioningFailed(String),
    /// The rotate callback changed the shared config
    RotateChanged(u8),
    /// A pipeline restart was handed to the collaborator
    RestartScheduled,
}

/// Non-blocking event dispatcher handed to every background component
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<ControlEvent>,
}

impl EventSender {
    /// Create a sender and the receiver the owning context drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ControlEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// A sender whose events go nowhere; for headless use and tests
    pub fn sink() -> Self {
        Self::channel().0
    }

    /// Post an event; silently drops it if nobody is listening anymore
    pub fn emit(&self, event: ControlEvent) {
        if self.tx.send(event).is_err() {
            trace!("control event receiver dropped");
        }
    }
}
