//! Serial transport
//!
//! Per-call serial access to the camera. The link carries newline-terminated
//! JSON with no length prefix; a response is considered complete when a `}`
//! byte has been seen or the read budget is exhausted. The `}` heuristic can
//! false-positive on a brace inside a string value; it is the framing the
//! camera firmware speaks and is kept as-is for compatibility.
//!
//! No handle outlives a call: every operation opens the device, uses it, and
//! closes it again, so discovery, provisioning and ad-hoc config pulls can
//! share one physical port without a connection object changing hands.

use serialport::SerialPort;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{ProtocolError, DEFAULT_BAUD_RATE, PROBE_TIMEOUT_MS};

/// Probe request sent during discovery
pub const PROBE_MESSAGE: &[u8] = b"{\"status\":1}\n";

/// Substring expected in a probe response from a camera
pub const PROBE_ACK: &[u8] = b"{\"status\":1}";

/// Poll interval while waiting for response bytes
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Byte-level access to a camera serial device.
///
/// `SerialTransport` is the real implementation; tests script replies through
/// mock implementations of this trait.
pub trait Transport: Send + Sync + 'static {
    /// Write `message` and read until a `}` byte or the timeout.
    ///
    /// An empty result means "no response" and is not an error; callers
    /// decide whether that is fatal for their operation.
    fn request(&self, path: &str, message: &[u8], timeout: Duration)
        -> Result<Vec<u8>, ProtocolError>;

    /// Write `message` without waiting for a reply (IP announce).
    fn send_only(&self, path: &str, message: &[u8]) -> Result<(), ProtocolError>;

    /// Cheap liveness probe: true iff the device echoes the probe payload.
    fn probe(&self, path: &str) -> bool {
        match self.request(
            path,
            PROBE_MESSAGE,
            Duration::from_millis(PROBE_TIMEOUT_MS),
        ) {
            Ok(response) => contains_subslice(&response, PROBE_ACK),
            Err(_) => false,
        }
    }
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

/// Open a serial device with the camera's fixed line settings
fn open_port(path: &str) -> Result<Box<dyn SerialPort>, ProtocolError> {
    // Short handle timeout; the overall budget is enforced by the read loop
    serialport::new(path, DEFAULT_BAUD_RATE)
        .timeout(Duration::from_millis(50))
        .open()
        .map_err(|e| ProtocolError::Serial(e.to_string()))
}

/// Configure a port for camera communication (115200-8N1, no flow control)
fn configure_port(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
    port.set_data_bits(serialport::DataBits::Eight)
        .map_err(|e| ProtocolError::Serial(e.to_string()))?;
    port.set_parity(serialport::Parity::None)
        .map_err(|e| ProtocolError::Serial(e.to_string()))?;
    port.set_stop_bits(serialport::StopBits::One)
        .map_err(|e| ProtocolError::Serial(e.to_string()))?;
    port.set_flow_control(serialport::FlowControl::None)
        .map_err(|e| ProtocolError::Serial(e.to_string()))?;
    Ok(())
}

/// Blocking serial transport backed by the `serialport` crate.
///
/// All methods open and close the device per call; run them on a blocking
/// task, never on an async executor thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialTransport;

impl SerialTransport {
    /// Create a transport. Stateless; exists for symmetry with mocks.
    pub fn new() -> Self {
        SerialTransport
    }
}

impl Transport for SerialTransport {
    fn request(
        &self,
        path: &str,
        message: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, ProtocolError> {
        let mut port = open_port(path)?;
        configure_port(port.as_mut())?;

        // Drop any stale bytes from a previous exchange
        let _ = port.clear(serialport::ClearBuffer::All);

        port.write_all(message)?;
        let _ = port.flush();

        let deadline = Instant::now() + timeout;
        let mut response = Vec::new();
        let mut buffer = [0u8; 512];

        while Instant::now() < deadline {
            let available = port
                .bytes_to_read()
                .map_err(|e| ProtocolError::Serial(e.to_string()))?;

            if available == 0 {
                std::thread::sleep(POLL_INTERVAL);
                continue;
            }

            let to_read = (available as usize).min(buffer.len());
            match port.read(&mut buffer[..to_read]) {
                Ok(0) => break,
                Ok(n) => {
                    response.extend_from_slice(&buffer[..n]);
                    // End of message: the protocol has no framing beyond a
                    // closing brace
                    if buffer[..n].contains(&b'}') {
                        break;
                    }
                }
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::TimedOut
                        || e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(ProtocolError::Io(e)),
            }
        }

        // Port handle closes on drop, on every path
        Ok(response)
    }

    fn send_only(&self, path: &str, message: &[u8]) -> Result<(), ProtocolError> {
        let mut port = open_port(path)?;
        configure_port(port.as_mut())?;
        let _ = port.clear(serialport::ClearBuffer::All);
        port.write_all(message)?;
        let _ = port.flush();
        Ok(())
    }
}

/// Mutual exclusion for the physical serial device.
///
/// Discovery scans and provisioning flows must not overlap on the same
/// device. The gate rejects instead of queueing: a second caller gets `None`
/// immediately and is expected to surface "busy" to its own caller.
#[derive(Debug, Clone, Default)]
pub struct DeviceGate {
    busy: Arc<AtomicBool>,
}

impl DeviceGate {
    /// Create a free gate
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take the device; `None` while another holder exists
    pub fn try_acquire(&self) -> Option<DeviceGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| DeviceGuard {
                busy: Arc::clone(&self.busy),
            })
    }

    /// Whether some holder currently owns the device
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases the device on drop
#[derive(Debug)]
pub struct DeviceGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
