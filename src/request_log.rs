//! Append-only audit trail of recommendation requests, kept as a JSON array
//! on disk and trimmed to the most recent entries.

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use tracing::warn;

pub const MAX_ENTRIES: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRequestLog {
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    /// `None` when the request carried a non-finite coordinate.
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub cuisine: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl ApiRequestLog {
    /// A coordinate as stored on disk. JSON has no NaN or infinity.
    pub fn coordinate(v: f64) -> Option<f64> {
        v.is_finite().then_some(v)
    }
}

pub struct RequestLog {
    path: PathBuf,
    max_entries: usize,
    // serializes read-modify-write cycles
    lock: Mutex<()>,
}

impl RequestLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_capacity(path, MAX_ENTRIES)
    }

    pub fn with_capacity(path: impl Into<PathBuf>, max_entries: usize) -> Self {
        Self {
            path: path.into(),
            max_entries,
            lock: Mutex::new(()),
        }
    }

    /// Append an entry. Failures are logged, never returned.
    pub fn append(&self, entry: ApiRequestLog) {
        if let Err(e) = self.try_append(entry) {
            warn!("Failed to write request log {}: {}", self.path.display(), e);
        }
    }

    fn try_append(&self, entry: ApiRequestLog) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut entries = self.read_entries();
        entries.push(entry);
        if entries.len() > self.max_entries {
            let excess = entries.len() - self.max_entries;
            entries.drain(..excess);
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&entries)?)?;
        Ok(())
    }

    /// All stored entries, oldest first. A missing or corrupt file reads as empty.
    pub fn entries(&self) -> Vec<ApiRequestLog> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.read_entries()
    }

    /// An unreadable file is moved aside to `<name>.bak` and reads as empty.
    fn read_entries(&self) -> Vec<ApiRequestLog> {
        let Ok(data) = fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        serde_json::from_str(&data).unwrap_or_else(|e| {
            let backup = self.backup_path();
            warn!(
                "Unreadable request log {}: {}; moving it to {}",
                self.path.display(),
                e,
                backup.display()
            );
            if let Err(e) = fs::rename(&self.path, &backup) {
                warn!("Failed to move request log aside: {}", e);
            }
            Vec::new()
        })
    }

    fn backup_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".bak");
        self.path.with_file_name(name)
    }
}
