use super::{KeySubscription, KeyValueStore, RegistryKey, RegistryRoot, WaitOutcome};
use crate::error::{MonitorError, MonitorResult};
use hostwatch_driver::registry::{self, Hive, KeyNotification, WaitStatus};
use std::time::Duration;

/// The Windows registry; every call fails off Windows
#[derive(Debug, Default, Clone, Copy)]
pub struct RegistryKeyStore;

fn hive(root: RegistryRoot) -> Hive {
    match root {
        RegistryRoot::CurrentUser => Hive::CurrentUser,
        RegistryRoot::LocalMachine => Hive::LocalMachine,
    }
}

impl KeyValueStore for RegistryKeyStore {
    fn read(&self, key: &RegistryKey, value: &str) -> MonitorResult<Option<String>> {
        registry::read_value(hive(key.root), &key.subkey, value)
            .map_err(|e| MonitorError::KeyRead(format!("{}\\{}: {}", key, value, e)))
    }

    fn subscribe(&self, key: &RegistryKey) -> MonitorResult<Box<dyn KeySubscription>> {
        let mut notification = KeyNotification::open(hive(key.root), &key.subkey)
            .map_err(|e| MonitorError::KeyOpen(format!("{}: {}", key, e)))?;
        // Registered here so changes made before the watcher thread runs still signal
        notification
            .arm()
            .map_err(|e| MonitorError::KeyNotify(format!("{}: {}", key, e)))?;
        Ok(Box::new(RegistrySubscription { notification }))
    }

    fn backend(&self) -> &'static str {
        "registry"
    }
}

struct RegistrySubscription {
    notification: KeyNotification,
}

impl KeySubscription for RegistrySubscription {
    fn arm(&mut self) -> MonitorResult<()> {
        self.notification
            .arm()
            .map_err(|e| MonitorError::KeyNotify(e.to_string()))
    }

    fn wait(&mut self, timeout: Duration) -> MonitorResult<WaitOutcome> {
        match self.notification.wait(timeout) {
            Ok(WaitStatus::Signaled) => Ok(WaitOutcome::Signaled),
            Ok(WaitStatus::TimedOut) => Ok(WaitOutcome::TimedOut),
            Err(e) => Err(MonitorError::KeyNotify(e.to_string())),
        }
    }

    fn reset(&mut self) {
        self.notification.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(windows))]
    fn test_registry_store_fails_off_windows() {
        let key = RegistryKey::new(RegistryRoot::CurrentUser, "Software\\EDRTest");
        assert!(matches!(RegistryKeyStore.read(&key, "TestValue"), Err(MonitorError::KeyRead(_))));
        assert!(matches!(RegistryKeyStore.subscribe(&key), Err(MonitorError::KeyOpen(_))));
    }

    #[test]
    #[cfg(windows)]
    fn test_change_before_first_wait_signals() -> MonitorResult<()> {
        use winreg::enums::HKEY_CURRENT_USER;
        use winreg::RegKey;

        let subkey = format!("Software\\hostwatch-test-{}", std::process::id());
        let hkcu = RegKey::predef(HKEY_CURRENT_USER);
        let (created, _) = hkcu.create_subkey(&subkey)?;

        let key = RegistryKey::new(RegistryRoot::CurrentUser, subkey.clone());
        let mut subscription = RegistryKeyStore.subscribe(&key)?;
        created.set_value("X", &"C:\\app.exe".to_string())?;

        let outcome = subscription.wait(Duration::from_secs(2));
        drop(subscription);
        hkcu.delete_subkey_all(&subkey)?;

        assert_eq!(outcome?, WaitOutcome::Signaled);
        Ok(())
    }
}
