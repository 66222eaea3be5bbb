//! Camera port discovery
//!
//! Builds a platform-specific ordered candidate list and probes each device
//! in turn until one answers like a camera. First match wins; the scan does
//! not continue looking for a "better" port. Per-candidate failures (busy,
//! missing, garbage reply) just mean "not this one".

use std::collections::HashMap;
#[cfg(all(unix, not(target_os = "macos")))]
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::serial::{DeviceGate, Transport};
use crate::events::{ControlEvent, EventSender};

/// An ephemeral discovery result; not persisted anywhere
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortCandidate {
    /// Device path or name (e.g. `/dev/ttyUSB0`, `COM3`)
    pub path: String,
    /// Human-readable origin of the candidate
    pub label: String,
}

impl SerialPortCandidate {
    fn new(path: impl Into<String>, label: &str) -> Self {
        Self {
            path: path.into(),
            label: label.to_string(),
        }
    }
}

/// Sort key so that ttyACM* ports come first (numerically), then ttyUSB*,
/// then ttyAMA*, then everything else by name
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    for (rank, prefix) in [(0, "ttyACM"), (1, "ttyUSB"), (2, "ttyAMA")] {
        if let Some(rest) = basename.strip_prefix(prefix) {
            let num = rest.parse::<usize>().unwrap_or(usize::MAX);
            return (rank, num, basename.to_string());
        }
    }
    (3, 0, basename.to_string())
}

/// Enumerate candidate camera ports in deterministic probe order
#[cfg(target_os = "windows")]
pub fn candidate_ports() -> Vec<SerialPortCandidate> {
    let mut map: HashMap<String, SerialPortCandidate> = HashMap::new();
    for info in serialport::available_ports().unwrap_or_default() {
        map.entry(info.port_name.clone())
            .or_insert_with(|| SerialPortCandidate::new(info.port_name, "Windows COM"));
    }
    // Numbered fallback; the enumeration API misses some USB CDC devices
    for com in 1..=20 {
        let name = format!("COM{com}");
        map.entry(name.clone())
            .or_insert_with(|| SerialPortCandidate::new(name, "Windows COM"));
    }
    let mut v: Vec<SerialPortCandidate> = map.into_values().collect();
    v.sort_by_key(|c| {
        let num = c.path.strip_prefix("COM").and_then(|n| n.parse::<usize>().ok());
        (num.unwrap_or(usize::MAX), c.path.clone())
    });
    v
}

/// Enumerate candidate camera ports in deterministic probe order
#[cfg(target_os = "macos")]
pub fn candidate_ports() -> Vec<SerialPortCandidate> {
    let mut map: HashMap<String, SerialPortCandidate> = HashMap::new();
    for info in serialport::available_ports().unwrap_or_default() {
        map.entry(info.port_name.clone())
            .or_insert_with(|| SerialPortCandidate::new(info.port_name, "Serial device"));
    }
    // callout devices first, then dial-in, filtered to likely USB serials
    if let Ok(entries) = std::fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                let is_serial = (fname.starts_with("cu.") || fname.starts_with("tty."))
                    && (fname.contains("usb") || fname.contains("modem") || fname.contains("serial"));
                if is_serial {
                    let full = format!("/dev/{fname}");
                    let label = if fname.starts_with("cu.") {
                        "macOS USB Serial"
                    } else {
                        "macOS USB Modem"
                    };
                    map.entry(full.clone())
                        .or_insert_with(|| SerialPortCandidate::new(full, label));
                }
            }
        }
    }
    let mut v: Vec<SerialPortCandidate> = map.into_values().collect();
    v.sort_by_key(|c| c.path.clone());
    v
}

/// Enumerate candidate camera ports in deterministic probe order
#[cfg(all(unix, not(target_os = "macos")))]
pub fn candidate_ports() -> Vec<SerialPortCandidate> {
    let mut map: HashMap<String, SerialPortCandidate> = HashMap::new();
    for info in serialport::available_ports().unwrap_or_default() {
        map.entry(info.port_name.clone())
            .or_insert_with(|| SerialPortCandidate::new(info.port_name, "Serial device"));
    }

    // /dev fallback for devices the enumeration API does not report
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                let label = if fname.starts_with("ttyUSB") {
                    Some("USB Serial")
                } else if fname.starts_with("ttyACM") {
                    Some("ACM Serial")
                } else if fname.starts_with("ttyAMA") {
                    Some("AMA Serial")
                } else {
                    None
                };
                if let Some(label) = label {
                    let full = format!("/dev/{fname}");
                    map.entry(full.clone())
                        .or_insert_with(|| SerialPortCandidate::new(full, label));
                }
            }
        }
    }

    // Stable by-id names, when udev provides them
    if let Ok(entries) = fs::read_dir("/dev/serial/by-id") {
        for entry in entries.flatten() {
            if let Some(path) = entry.path().to_str() {
                map.entry(path.to_string())
                    .or_insert_with(|| SerialPortCandidate::new(path, "Serial by-id"));
            }
        }
    }

    let mut v: Vec<SerialPortCandidate> = map.into_values().collect();
    v.sort_by_key(|c| port_sort_key(&c.path));
    v
}

/// First candidate, in list order, whose probe succeeds.
///
/// Stops at the first match; later candidates are never probed.
pub fn first_responding<'a, F>(
    candidates: &'a [SerialPortCandidate],
    mut probe: F,
) -> Option<&'a SerialPortCandidate>
where
    F: FnMut(&str) -> bool,
{
    candidates.iter().find(|candidate| probe(&candidate.path))
}

/// Probe every candidate port until a camera answers
pub fn find_camera_port<T: Transport + ?Sized>(transport: &T) -> Option<SerialPortCandidate> {
    let candidates = candidate_ports();
    debug!("probing {} candidate serial ports", candidates.len());
    let found = first_responding(&candidates, |path| transport.probe(path)).cloned();
    match &found {
        Some(candidate) => info!("camera found on {} ({})", candidate.path, candidate.label),
        None => info!("no camera found on any serial port"),
    }
    found
}

/// Re-triggerable background discovery.
///
/// Only one scan runs at a time and never while a provisioning flow holds
/// the serial device; both share a [`DeviceGate`]. A caller can pause
/// discovery to keep the device free for a competing operation.
pub struct DiscoveryService<T: Transport> {
    transport: Arc<T>,
    gate: DeviceGate,
    paused: Arc<AtomicBool>,
    events: EventSender,
}

impl<T: Transport> DiscoveryService<T> {
    /// Create a service sharing `gate` with the provisioning coordinator
    pub fn new(transport: Arc<T>, gate: DeviceGate, events: EventSender) -> Self {
        Self {
            transport,
            gate,
            paused: Arc::new(AtomicBool::new(false)),
            events,
        }
    }

    /// Stop future scans from starting; in-flight probes finish on their own
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
        debug!("discovery paused");
    }

    /// Allow scans again
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        debug!("discovery resumed");
    }

    /// Whether scans are currently suppressed
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Run one scan off the caller's thread.
    ///
    /// Returns `None` without scanning when paused or when the serial device
    /// is busy; the skipped scan is not queued.
    pub async fn scan(&self) -> Option<SerialPortCandidate> {
        if self.is_paused() {
            debug!("skipping discovery scan: paused");
            return None;
        }
        let Some(guard) = self.gate.try_acquire() else {
            debug!("skipping discovery scan: serial device busy");
            return None;
        };

        let transport = Arc::clone(&self.transport);
        let found = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            find_camera_port(transport.as_ref())
        })
        .await
        .unwrap_or_else(|err| {
            warn!("discovery task failed: {err}");
            None
        });

        self.events.emit(ControlEvent::PortScan(found.clone()));
        found
    }
}
