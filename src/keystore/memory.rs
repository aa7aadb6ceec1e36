use super::{KeySubscription, KeyValueStore, RegistryKey, WaitOutcome};
use crate::error::{MonitorError, MonitorResult};
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Default)]
struct KeyState {
    values: BTreeMap<String, String>,
    generation: u64,
}

#[derive(Default)]
struct Shared {
    keys: Mutex<HashMap<RegistryKey, KeyState>>,
    changed: Condvar,
}

impl Shared {
    fn bump(&self, key: &RegistryKey, update: impl FnOnce(&mut KeyState)) {
        let mut keys = self.keys.lock();
        let state = keys.entry(key.clone()).or_default();
        update(state);
        state.generation += 1;
        self.changed.notify_all();
    }
}

/// In-process key store; clones share the same values
#[derive(Clone, Default)]
pub struct MemoryKeyStore {
    shared: Arc<Shared>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty key so it can be subscribed to
    pub fn create_key(&self, key: &RegistryKey) {
        self.shared.keys.lock().entry(key.clone()).or_default();
    }

    /// Set a value, creating the key if needed, and signal subscribers
    pub fn set_value(&self, key: &RegistryKey, value: &str, data: &str) {
        self.shared.bump(key, |state| {
            state.values.insert(value.to_string(), data.to_string());
        });
    }

    /// Remove a value and signal subscribers
    pub fn delete_value(&self, key: &RegistryKey, value: &str) {
        self.shared.bump(key, |state| {
            state.values.remove(value);
        });
    }
}

impl KeyValueStore for MemoryKeyStore {
    fn read(&self, key: &RegistryKey, value: &str) -> MonitorResult<Option<String>> {
        let keys = self.shared.keys.lock();
        let state = keys
            .get(key)
            .ok_or_else(|| MonitorError::KeyRead(format!("key not found: {}", key)))?;
        Ok(state.values.get(value).cloned())
    }

    fn subscribe(&self, key: &RegistryKey) -> MonitorResult<Box<dyn KeySubscription>> {
        let seen = self
            .shared
            .keys
            .lock()
            .get(key)
            .map(|state| state.generation)
            .ok_or_else(|| MonitorError::KeyOpen(format!("key not found: {}", key)))?;

        Ok(Box::new(MemorySubscription {
            shared: Arc::clone(&self.shared),
            key: key.clone(),
            seen,
        }))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Fires once the key's generation moves past the last acknowledged one
struct MemorySubscription {
    shared: Arc<Shared>,
    key: RegistryKey,
    seen: u64,
}

impl MemorySubscription {
    fn generation(keys: &HashMap<RegistryKey, KeyState>, key: &RegistryKey) -> u64 {
        keys.get(key).map(|state| state.generation).unwrap_or(0)
    }
}

impl KeySubscription for MemorySubscription {
    fn arm(&mut self) -> MonitorResult<()> {
        Ok(())
    }

    fn wait(&mut self, timeout: Duration) -> MonitorResult<WaitOutcome> {
        let deadline = Instant::now() + timeout;
        let mut keys = self.shared.keys.lock();

        loop {
            if Self::generation(&keys, &self.key) > self.seen {
                return Ok(WaitOutcome::Signaled);
            }
            if self.shared.changed.wait_until(&mut keys, deadline).timed_out() {
                let signaled = Self::generation(&keys, &self.key) > self.seen;
                return Ok(if signaled { WaitOutcome::Signaled } else { WaitOutcome::TimedOut });
            }
        }
    }

    fn reset(&mut self) {
        self.seen = Self::generation(&self.shared.keys.lock(), &self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::RegistryRoot;
    use std::thread;

    fn key() -> RegistryKey {
        RegistryKey::new(RegistryRoot::LocalMachine, "SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\Run")
    }

    #[test]
    fn test_subscribe_requires_existing_key() {
        let store = MemoryKeyStore::new();
        assert!(matches!(store.subscribe(&key()), Err(MonitorError::KeyOpen(_))));
        store.create_key(&key());
        assert!(store.subscribe(&key()).is_ok());
    }

    #[test]
    fn test_wait_times_out_without_changes() -> MonitorResult<()> {
        let store = MemoryKeyStore::new();
        store.create_key(&key());
        let mut sub = store.subscribe(&key())?;

        sub.arm()?;
        assert_eq!(sub.wait(Duration::from_millis(20))?, WaitOutcome::TimedOut);
        Ok(())
    }

    #[test]
    fn test_change_from_another_thread_signals() -> MonitorResult<()> {
        let store = MemoryKeyStore::new();
        store.create_key(&key());
        let mut sub = store.subscribe(&key())?;

        let writer = store.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            writer.set_value(&key(), "X", "C:\\app.exe");
        });

        sub.arm()?;
        assert_eq!(sub.wait(Duration::from_secs(5))?, WaitOutcome::Signaled);
        sub.reset();
        assert_eq!(sub.wait(Duration::from_millis(20))?, WaitOutcome::TimedOut);

        handle.join().ok();
        assert_eq!(store.read(&key(), "X")?, Some("C:\\app.exe".to_string()));
        Ok(())
    }

    #[test]
    fn test_delete_value() -> MonitorResult<()> {
        let store = MemoryKeyStore::new();
        store.set_value(&key(), "X", "1");
        store.delete_value(&key(), "X");
        assert_eq!(store.read(&key(), "X")?, None);
        Ok(())
    }
}
