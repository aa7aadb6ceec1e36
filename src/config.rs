//! Agent configuration.
//!
//! Every field has a default, so an empty JSON object (or no file at all) is a
//! valid configuration. CLI flags are applied on top in `cli::Args::apply`.

use crate::error::{MonitorError, MonitorResult};
use crate::keystore::{RegistryKey, RegistryRoot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Targets
// ============================================================================

/// A folder watched by the polling scanner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorTarget {
    pub path: PathBuf,
    pub label: String,
    #[serde(default = "enabled")]
    pub active: bool,
}

impl MonitorTarget {
    pub fn new(path: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        MonitorTarget {
            path: path.into(),
            label: label.into(),
            active: true,
        }
    }
}

/// A key plus the value names watched under it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryTarget {
    pub root: RegistryRoot,
    pub subkey: String,
    #[serde(default)]
    pub values: BTreeSet<String>,
    #[serde(default = "enabled")]
    pub active: bool,
}

impl RegistryTarget {
    pub fn new<I, S>(root: RegistryRoot, subkey: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RegistryTarget {
            root,
            subkey: subkey.into(),
            values: values.into_iter().map(Into::into).collect(),
            active: true,
        }
    }

    pub fn key(&self) -> RegistryKey {
        RegistryKey::new(self.root, self.subkey.clone())
    }
}

fn enabled() -> bool {
    true
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between poll cycles
    pub interval_secs: u64,

    /// Bounded wait of each key watcher; also its shutdown poll interval
    pub watch_timeout_ms: u64,

    pub log_path: PathBuf,
    pub report_path: PathBuf,

    /// Add desktop, documents and downloads of the current user
    pub include_user_folders: bool,

    pub system_folders: Vec<PathBuf>,

    /// Directory names or path prefixes the scanner never enters
    pub exclude: Vec<String>,

    pub registry: Vec<RegistryTarget>,

    pub popups: bool,
    pub console_alerts: bool,

    /// JSON document backing the key store where the registry is unavailable
    pub key_store_path: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            interval_secs: 1,
            watch_timeout_ms: 1000,
            log_path: PathBuf::from("hostwatch.log"),
            report_path: PathBuf::from("hostwatch_report.json"),
            include_user_folders: true,
            system_folders: [
                "C:\\Windows\\System32",
                "C:\\Windows\\System",
                "C:\\Program Files",
                "C:\\Program Files (x86)",
                "C:\\Users\\Public",
            ]
            .iter()
            .map(PathBuf::from)
            .collect(),
            exclude: Vec::new(),
            registry: default_registry_targets(),
            popups: true,
            console_alerts: true,
            key_store_path: PathBuf::from("hostwatch_keys.json"),
        }
    }
}

impl MonitorConfig {
    /// Read a JSON configuration file; missing fields take their defaults
    pub fn load(path: &Path) -> MonitorResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| MonitorError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: MonitorConfig = serde_json::from_str(&text)
            .map_err(|e| MonitorError::Config(format!("invalid {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn watch_timeout(&self) -> Duration {
        Duration::from_millis(self.watch_timeout_ms)
    }

    pub fn validate(&self) -> MonitorResult<()> {
        if self.interval_secs == 0 {
            return Err(MonitorError::Config("interval_secs must be at least 1".to_string()));
        }
        if self.watch_timeout_ms == 0 {
            return Err(MonitorError::Config("watch_timeout_ms must be at least 1".to_string()));
        }
        if let Some(target) = self.registry.iter().find(|t| t.subkey.trim().is_empty()) {
            return Err(MonitorError::Config(format!("empty subkey under {}", target.root)));
        }
        Ok(())
    }
}

/// Keys watched out of the box: a test key plus common persistence locations
pub fn default_registry_targets() -> Vec<RegistryTarget> {
    let current_version = "SOFTWARE\\Microsoft\\Windows\\CurrentVersion";
    let no_values: [&str; 0] = [];

    vec![
        RegistryTarget::new(RegistryRoot::CurrentUser, "Software\\EDRTest", ["TestValue"]),
        RegistryTarget::new(
            RegistryRoot::LocalMachine,
            "SOFTWARE\\Microsoft\\Windows NT\\CurrentVersion\\Windows",
            ["loadappinit_dlls", "appinit_dlls", "iconservicelib"],
        ),
        RegistryTarget::new(
            RegistryRoot::LocalMachine,
            format!("{}\\Explorer\\Shell Folders", current_version),
            ["common startup", "startup"],
        ),
        RegistryTarget::new(RegistryRoot::LocalMachine, format!("{}\\Run", current_version), no_values),
        RegistryTarget::new(RegistryRoot::LocalMachine, format!("{}\\RunOnce", current_version), no_values),
    ]
}
