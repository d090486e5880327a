//! File-based invocation telemetry for local subprocess servers.
//!
//! A test server attaches a [`TelemetrySink`] and appends one record per
//! tool invocation to a JSON file keyed by tool name; tests read the
//! most-recent run back through [`TelemetryReader`]. Purely
//! observational, never required in production.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRecord {
    pub arguments: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Server-side sink writing one JSON file per tool into a run directory.
pub struct TelemetrySink {
    dir: PathBuf,
}

impl TelemetrySink {
    /// Create a fresh run directory under `root`.
    pub fn create(root: &Path) -> io::Result<Self> {
        let dir = root.join(format!("run-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append `{arguments, timestamp}` to the file for `tool`.
    pub fn record(&self, tool: &str, arguments: &serde_json::Value) -> io::Result<()> {
        let path = self.dir.join(format!("{tool}.json"));
        let mut records = read_records(&path);
        records.push(InvocationRecord {
            arguments: arguments.clone(),
            timestamp: Utc::now(),
        });
        fs::write(&path, serde_json::to_vec_pretty(&records)?)
    }
}

/// Reads invocation records back from a run directory.
pub struct TelemetryReader {
    dir: PathBuf,
}

impl TelemetryReader {
    /// Open the most recently modified run directory under `root`.
    pub fn latest(root: &Path) -> Option<Self> {
        let entries = fs::read_dir(root).ok()?;
        let newest = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .max_by_key(|entry| {
                entry
                    .metadata()
                    .and_then(|metadata| metadata.modified())
                    .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
            })?;
        Some(Self {
            dir: newest.path(),
        })
    }

    /// Open a specific run directory.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn was_called(&self, tool: &str) -> bool {
        self.call_count(tool) > 0
    }

    pub fn call_count(&self, tool: &str) -> usize {
        self.calls_for(tool).len()
    }

    pub fn calls_for(&self, tool: &str) -> Vec<InvocationRecord> {
        read_records(&self.dir.join(format!("{tool}.json")))
    }
}

fn read_records(path: &Path) -> Vec<InvocationRecord> {
    let Ok(bytes) = fs::read(path) else {
        return Vec::new();
    };
    serde_json::from_slice(&bytes).unwrap_or_default()
}
