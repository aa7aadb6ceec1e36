//! Named configuration values and change notification.
//!
//! [`KeyValueStore`] is the capability the key watchers and the report
//! generator use. Backends:
//! - [`RegistryKeyStore`]: the Windows registry via `hostwatch-driver`
//! - [`JsonFileKeyStore`]: a JSON document watched by modification stamp
//! - [`MemoryKeyStore`]: in-process values, used for embedding and tests

mod file;
mod memory;
mod registry;

pub use file::JsonFileKeyStore;
pub use memory::MemoryKeyStore;
pub use registry::RegistryKeyStore;

use crate::error::MonitorResult;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Rendering of a value that is missing or could not be read
pub const UNAVAILABLE: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegistryRoot {
    #[serde(rename = "HKCU")]
    CurrentUser,
    #[serde(rename = "HKLM")]
    LocalMachine,
}

impl fmt::Display for RegistryRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryRoot::CurrentUser => f.write_str("HKCU"),
            RegistryRoot::LocalMachine => f.write_str("HKLM"),
        }
    }
}

/// A key addressed by root + subkey
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistryKey {
    pub root: RegistryRoot,
    pub subkey: String,
}

impl RegistryKey {
    pub fn new(root: RegistryRoot, subkey: impl Into<String>) -> Self {
        RegistryKey { root, subkey: subkey.into() }
    }
}

impl fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\\{}", self.root, self.subkey)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Signaled,
    TimedOut,
}

pub trait KeyValueStore: Send + Sync {
    /// Read `value` under `key`; `Ok(None)` if the key exists but the value does not
    fn read(&self, key: &RegistryKey, value: &str) -> MonitorResult<Option<String>>;

    /// Open `key` for change notification
    ///
    /// Changes made after this returns must signal the first `wait`.
    fn subscribe(&self, key: &RegistryKey) -> MonitorResult<Box<dyn KeySubscription>>;

    /// Short backend name for log lines
    fn backend(&self) -> &'static str;
}

/// An open notification registration on one key
///
/// Dropping the subscription releases whatever handles it holds.
pub trait KeySubscription: Send {
    /// Register interest in the next change
    fn arm(&mut self) -> MonitorResult<()>;

    /// Block until the key changes or `timeout` elapses
    fn wait(&mut self, timeout: Duration) -> MonitorResult<WaitOutcome>;

    /// Acknowledge a signal; called before the value is re-read
    fn reset(&mut self);
}

/// Live read rendered for display, [`UNAVAILABLE`] on any failure
pub fn read_or_unavailable(store: &dyn KeyValueStore, key: &RegistryKey, value: &str) -> String {
    match store.read(key, value) {
        Ok(Some(data)) => data,
        Ok(None) => UNAVAILABLE.to_string(),
        Err(e) => {
            debug!("Failed to read {}\\{}: {}", key, value, e);
            UNAVAILABLE.to_string()
        }
    }
}
