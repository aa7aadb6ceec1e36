//! Per-cycle state report.
//!
//! File entries come from the state store as last diffed; registry entries
//! are live reads, not the startup baseline.

use crate::config::{MonitorTarget, RegistryTarget};
use crate::error::MonitorResult;
use crate::keystore::{read_or_unavailable, KeyValueStore};
use crate::state::StateStore;
use chrono::Local;
use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const STATUS_ACTIVE: &str = "active";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub last_modified: String,
    pub exists: bool,
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub timestamp: String,
    pub monitor_status: String,
    /// Target root → path → entry
    pub files: BTreeMap<String, BTreeMap<String, FileEntry>>,
    /// Subkey → value name → current value
    pub registry: BTreeMap<String, BTreeMap<String, String>>,
}

/// Build the report for the current cycle
pub fn generate_report(
    store: &StateStore,
    targets: &[MonitorTarget],
    registry: &[RegistryTarget],
    keys: &dyn KeyValueStore,
) -> Report {
    let mut files = BTreeMap::new();
    for target in targets.iter().filter(|t| t.active) {
        let entries = store
            .snapshot(&target.path)
            .map(|snapshot| {
                snapshot
                    .iter()
                    .map(|(path, record)| {
                        let entry = FileEntry {
                            last_modified: record.last_modified.clone(),
                            exists: record.exists,
                            fingerprint: record.fingerprint.clone(),
                        };
                        (path.display().to_string(), entry)
                    })
                    .collect()
            })
            .unwrap_or_default();
        files.insert(target.path.display().to_string(), entries);
    }

    let mut values = BTreeMap::new();
    for target in registry.iter().filter(|t| t.active) {
        let key = target.key();
        let current: BTreeMap<String, String> = target
            .values
            .iter()
            .map(|value| (value.clone(), read_or_unavailable(keys, &key, value)))
            .collect();
        values.insert(target.subkey.clone(), current);
    }

    Report {
        timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        monitor_status: STATUS_ACTIVE.to_string(),
        files,
        registry: values,
    }
}

// ============================================================================
// Sinks
// ============================================================================

pub trait ReportSink: Send {
    /// Persist `report`, replacing the previous one
    fn write(&mut self, report: &Report) -> MonitorResult<()>;
}

/// Pretty-printed JSON file, replaced atomically each cycle
#[derive(Debug, Clone)]
pub struct JsonFileReport {
    path: PathBuf,
}

impl JsonFileReport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileReport { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportSink for JsonFileReport {
    fn write(&mut self, report: &Report) -> MonitorResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_vec_pretty(report)?;
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, json)?;
        fs::rename(&temp_path, &self.path)?;

        debug!("Report written to {}", self.path.display());
        Ok(())
    }
}

/// Keeps the last report in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryReport {
    last: Arc<Mutex<Option<Report>>>,
    writes: Arc<Mutex<usize>>,
}

impl MemoryReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<Report> {
        self.last.lock().clone()
    }

    pub fn writes(&self) -> usize {
        *self.writes.lock()
    }
}

impl ReportSink for MemoryReport {
    fn write(&mut self, report: &Report) -> MonitorResult<()> {
        *self.last.lock() = Some(report.clone());
        *self.writes.lock() += 1;
        Ok(())
    }
}
