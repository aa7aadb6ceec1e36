use super::{KeySubscription, KeyValueStore, RegistryKey, WaitOutcome};
use crate::error::{MonitorError, MonitorResult};
use crossbeam_channel::{self as channel, Receiver, RecvTimeoutError};
use log::{debug, warn};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::Value;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Quiet period that ends one burst of file events
const SETTLE: Duration = Duration::from_millis(50);

type Document = BTreeMap<String, BTreeMap<String, Value>>;

/// Key store backed by a JSON document
///
/// ```json
/// { "HKCU\\Software\\EDRTest": { "TestValue": "on" } }
/// ```
///
/// Any write to the file counts as a change to every key in it.
#[derive(Debug, Clone)]
pub struct JsonFileKeyStore {
    path: PathBuf,
}

impl JsonFileKeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileKeyStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> MonitorResult<Document> {
        let text = fs::read_to_string(&self.path)
            .map_err(|e| MonitorError::KeyRead(format!("{}: {}", self.path.display(), e)))?;
        serde_json::from_str(&text)
            .map_err(|e| MonitorError::KeyRead(format!("{}: {}", self.path.display(), e)))
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(items) => items.iter().map(render).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

impl KeyValueStore for JsonFileKeyStore {
    fn read(&self, key: &RegistryKey, value: &str) -> MonitorResult<Option<String>> {
        let document = self.load()?;
        let values = document
            .get(&key.to_string())
            .ok_or_else(|| MonitorError::KeyRead(format!("key not found: {}", key)))?;
        Ok(values.get(value).map(render))
    }

    fn subscribe(&self, key: &RegistryKey) -> MonitorResult<Box<dyn KeySubscription>> {
        let document = self
            .load()
            .map_err(|e| MonitorError::KeyOpen(format!("{}: {}", key, e)))?;
        if !document.contains_key(&key.to_string()) {
            return Err(MonitorError::KeyOpen(format!("key not found: {}", key)));
        }

        FileSubscription::open(&self.path)
            .map(|subscription| Box::new(subscription) as Box<dyn KeySubscription>)
            .map_err(|e| MonitorError::KeyOpen(format!("{}: {}", key, e)))
    }

    fn backend(&self) -> &'static str {
        "json-file"
    }
}

/// Watches the document's parent directory so editors that replace the
/// file by rename are still seen
struct FileSubscription {
    _watcher: RecommendedWatcher,
    events: Receiver<notify::Result<Event>>,
    file_name: OsString,
}

impl FileSubscription {
    fn open(path: &Path) -> MonitorResult<Self> {
        let file_name = path
            .file_name()
            .map(|name| name.to_os_string())
            .ok_or_else(|| MonitorError::KeyOpen(format!("{} is not a file path", path.display())))?;
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, rx) = channel::unbounded();
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            // Receiver gone means the subscription was dropped
            let _ = tx.send(result);
        })
        .map_err(|e| MonitorError::KeyNotify(e.to_string()))?;
        watcher
            .watch(&parent, RecursiveMode::NonRecursive)
            .map_err(|e| MonitorError::KeyNotify(e.to_string()))?;

        debug!("Watching {} for key changes", path.display());
        Ok(FileSubscription {
            _watcher: watcher,
            events: rx,
            file_name,
        })
    }

    fn concerns_file(&self, event: &Event) -> bool {
        let writes = matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
        );
        writes && event.paths.iter().any(|p| p.file_name() == Some(self.file_name.as_os_str()))
    }
}

impl KeySubscription for FileSubscription {
    fn arm(&mut self) -> MonitorResult<()> {
        Ok(())
    }

    fn wait(&mut self, timeout: Duration) -> MonitorResult<WaitOutcome> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(Ok(event)) if self.concerns_file(&event) => return Ok(WaitOutcome::Signaled),
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!("File watch error: {}", e),
                Err(RecvTimeoutError::Timeout) => return Ok(WaitOutcome::TimedOut),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(MonitorError::KeyNotify("file watcher stopped".to_string()))
                }
            }
        }
    }

    /// Swallow the rest of the burst that produced the signal
    fn reset(&mut self) {
        while self.events.recv_timeout(SETTLE).is_ok() {}
    }
}
