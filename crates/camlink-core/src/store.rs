//! Persisted provisioning record
//!
//! A single JSON file records the last successfully provisioned camera: its
//! IP and whatever config snapshot could be pulled from it. It is rewritten
//! on every successful Wi-Fi connect and read back later to decide whether
//! the camera in front of us is the one we already set up.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the persisted record
pub const RECORD_FILE: &str = "camera_tx.json";

/// The one persisted outcome of a provisioning cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningRecord {
    /// Transmitter IP learned from the Wi-Fi connect reply
    pub camera_ip: String,
    /// Pulled transmitter config; an empty object when the pull failed
    #[serde(default)]
    pub tx: Value,
    /// When the record was written; absent in files from older builds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

impl ProvisioningRecord {
    /// Record a provisioning outcome, stamped now
    pub fn new(camera_ip: impl Into<String>, tx: Value) -> Self {
        Self {
            camera_ip: camera_ip.into(),
            tx,
            saved_at: Some(Utc::now()),
        }
    }
}

/// Loads and saves the provisioning record at a fixed path
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    /// Store backed by an explicit file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the platform's default location
    pub fn open_default() -> Self {
        Self::new(Self::default_path())
    }

    /// `<local data dir>/camlink/camera_tx.json`
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("camlink")
            .join(RECORD_FILE)
    }

    /// Where this store reads and writes
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the record back; any missing/corrupt file is just "no record"
    pub fn load(&self) -> Option<ProvisioningRecord> {
        let raw = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(err) => {
                debug!("ignoring unreadable provisioning record: {err}");
                None
            }
        }
    }

    /// Overwrite the record
    pub fn save(&self, record: &ProvisioningRecord) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = serde_json::to_string_pretty(record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        out.push('\n');
        fs::write(&self.path, out)
    }

    /// Whether the stored record is for the camera at `ip`.
    ///
    /// False means the camera changed (or no record exists) and
    /// re-provisioning is advisable.
    pub fn matches_ip(&self, ip: &str) -> bool {
        self.load().map(|r| r.camera_ip == ip).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn temp_store() -> (tempfile::TempDir, RecordStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = RecordStore::new(dir.path().join("nested").join(RECORD_FILE));
        (dir, store)
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let (_dir, store) = temp_store();
        let record = ProvisioningRecord::new(
            "192.168.4.1",
            json!({ "host": "192.168.4.20", "width": 1280 }),
        );
        store.save(&record).expect("save");

        let loaded = store.load().expect("load");
        assert_eq!(loaded, record);
        assert!(store.matches_ip("192.168.4.1"));
        assert!(!store.matches_ip("192.168.4.2"));
    }

    #[test]
    fn test_missing_file_is_no_record() {
        let (_dir, store) = temp_store();
        assert!(store.load().is_none());
        assert!(!store.matches_ip("192.168.4.1"));
    }

    #[test]
    fn test_corrupt_file_is_no_record() {
        let (_dir, store) = temp_store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{ not json").unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn test_record_without_timestamp_loads() {
        let (_dir, store) = temp_store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(
            store.path(),
            r#"{ "camera_ip": "10.0.0.9", "tx": {} }"#,
        )
        .unwrap();

        let record = store.load().expect("load");
        assert_eq!(record.camera_ip, "10.0.0.9");
        assert_eq!(record.tx, json!({}));
        assert!(record.saved_at.is_none());
    }
}
