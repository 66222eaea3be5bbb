//! Camera configuration
//!
//! The single source of truth for the `{host, port, width, height,
//! framerate, rotate}` tuple shared between the serial protocol, the HTTP
//! clients and the video pipeline. Owned by the provisioning coordinator;
//! everything else works on copies or short-lived locked views.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Selectable resolution presets, landscape orientation
pub const RESOLUTION_PRESETS: [(u32, u32); 2] = [(1280, 720), (1920, 1080)];

/// Selectable framerates
pub const FRAMERATE_PRESETS: [u32; 3] = [30, 50, 60];

/// Default HTTP port of the transmitter's control surface
pub const DEFAULT_TX_HTTP_PORT: u16 = 8888;

/// Default UDP port the receiver ingests the stream on
pub const DEFAULT_RX_STREAM_PORT: u16 = 8888;

/// True for the rotations (90°/270°) that exchange the frame's axes
pub fn rotate_swaps_axes(rotate: u8) -> bool {
    rotate % 2 != 0
}

/// Current camera/stream configuration.
///
/// Invariant: `width`/`height` are the preset's dimensions, swapped exactly
/// when `rotate` is odd. [`CameraConfig::set_rotate`] maintains this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Transmitter host (learned from a Wi-Fi connect reply)
    pub tx_host: String,
    /// Transmitter HTTP control port
    pub tx_port: u16,
    /// Receiver host the transmitter streams to
    pub rx_host: String,
    /// Receiver stream port
    pub rx_port: u16,
    /// Frame width, oriented per `rotate`
    pub width: u32,
    /// Frame height, oriented per `rotate`
    pub height: u32,
    /// Frames per second
    pub framerate: u32,
    /// Quarter-turn rotation: 0 none, 1 = 90°, 2 = 180°, 3 = 270°
    pub rotate: u8,
}

impl Default for CameraConfig {
    fn default() -> Self {
        let (width, height) = RESOLUTION_PRESETS[0];
        Self {
            tx_host: "127.0.0.1".to_string(),
            tx_port: DEFAULT_TX_HTTP_PORT,
            rx_host: "127.0.0.1".to_string(),
            rx_port: DEFAULT_RX_STREAM_PORT,
            width,
            height,
            framerate: FRAMERATE_PRESETS[0],
            rotate: 0,
        }
    }
}

impl CameraConfig {
    /// Set the rotation, clamping to 0..=3 and re-orienting width/height.
    ///
    /// Crossing between an even and an odd rotation swaps the axes exactly
    /// once; staying on the same parity leaves them alone, so two odd
    /// rotations in a row land back on the original orientation.
    pub fn set_rotate(&mut self, rotate: u8) {
        let rotate = rotate.min(3);
        if rotate_swaps_axes(self.rotate) != rotate_swaps_axes(rotate) {
            std::mem::swap(&mut self.width, &mut self.height);
        }
        self.rotate = rotate;
    }

    /// Select a resolution preset by index (out of range falls back to 0),
    /// keeping the orientation implied by the current rotation
    pub fn select_resolution(&mut self, index: usize) {
        let index = if index < RESOLUTION_PRESETS.len() { index } else { 0 };
        let (width, height) = RESOLUTION_PRESETS[index];
        self.width = width;
        self.height = height;
        if rotate_swaps_axes(self.rotate) {
            std::mem::swap(&mut self.width, &mut self.height);
        }
    }

    /// Select a framerate preset by index (out of range falls back to 0)
    pub fn select_framerate(&mut self, index: usize) {
        let index = if index < FRAMERATE_PRESETS.len() { index } else { 0 };
        self.framerate = FRAMERATE_PRESETS[index];
    }
}

/// Shared, mutex-guarded configuration handle.
///
/// The one mutual-exclusion mechanism around config reads and writes; lock
/// only for short, await-free sections.
pub type SharedConfig = Arc<Mutex<CameraConfig>>;

/// Wrap a config for sharing between the coordinator and the control server
pub fn shared(config: CameraConfig) -> SharedConfig {
    Arc::new(Mutex::new(config))
}
