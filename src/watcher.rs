//! Key watchers.
//!
//! One thread per watched (key, value). Each blocks on its key's change
//! notification with a bounded timeout; every timeout is a chance to observe
//! the shutdown token. On a signal the value is re-read and a `ValueChanged`
//! event goes to the alert dispatcher. Watchers never touch the state store.

use crate::alert::AlertHandle;
use crate::error::MonitorResult;
use crate::event::{ChangeEvent, ChangeKind};
use crate::keystore::{read_or_unavailable, KeySubscription, KeyValueStore, RegistryKey, WaitOutcome};
use crate::shutdown::ShutdownToken;
use log::{debug, error, info};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    Armed,
    Waiting,
    Notified,
    /// Terminal; the key could not be opened or notification broke
    Failed,
    /// Terminal; shutdown observed
    Stopped,
}

/// How a watcher thread ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherExit {
    pub state: WatcherState,
    pub notifications: usize,
}

pub struct KeyWatcher {
    key: RegistryKey,
    value: String,
    store: Arc<dyn KeyValueStore>,
    alerts: AlertHandle,
    shutdown: ShutdownToken,
    timeout: Duration,
}

impl KeyWatcher {
    pub fn new(
        key: RegistryKey,
        value: impl Into<String>,
        store: Arc<dyn KeyValueStore>,
        alerts: AlertHandle,
        shutdown: ShutdownToken,
        timeout: Duration,
    ) -> Self {
        KeyWatcher {
            key,
            value: value.into(),
            store,
            alerts,
            shutdown,
            timeout,
        }
    }

    pub fn name(&self) -> String {
        format!("{}\\{}", self.key, self.value)
    }

    /// Open the key and start the watcher thread
    ///
    /// The key is opened and registered for notification on the calling
    /// thread, so changes made right after `start` returns are not missed by
    /// any backend. An open failure is the watcher's
    /// terminal `Failed` state: it is logged once and returned, never retried.
    pub fn start(self) -> MonitorResult<WatcherHandle> {
        let name = self.name();

        let subscription = match self.store.subscribe(&self.key) {
            Ok(subscription) => subscription,
            Err(e) => {
                error!("Failed to open key for monitoring: {} ({})", name, e);
                self.alerts
                    .note(format!("[ERROR] Failed to open registry key for monitoring: {} ({})", name, e));
                return Err(e);
            }
        };

        let worker = thread::Builder::new()
            .name(format!("key-watcher {}", name))
            .spawn(move || self.run(subscription))?;

        Ok(WatcherHandle { name, worker })
    }

    fn run(self, mut subscription: Box<dyn KeySubscription>) -> WatcherExit {
        let name = self.name();
        let mut state = WatcherState::Armed;
        let mut notifications = 0;

        debug!("Watching {} via {}", name, self.store.backend());

        let state = loop {
            state = match state {
                WatcherState::Armed => {
                    if self.shutdown.is_cancelled() {
                        break WatcherState::Stopped;
                    }
                    match subscription.arm() {
                        Ok(()) => WatcherState::Waiting,
                        Err(e) => {
                            error!("Failed to set notification on {}: {}", name, e);
                            self.alerts.note(format!("[ERROR] Failed to set registry notification: {} ({})", name, e));
                            break WatcherState::Failed;
                        }
                    }
                }
                WatcherState::Waiting => match subscription.wait(self.timeout) {
                    Ok(WaitOutcome::TimedOut) => WatcherState::Armed,
                    Ok(WaitOutcome::Signaled) => WatcherState::Notified,
                    Err(e) => {
                        error!("Wait failed on {}: {}", name, e);
                        self.alerts.note(format!("[ERROR] Registry wait failed: {} ({})", name, e));
                        break WatcherState::Failed;
                    }
                },
                WatcherState::Notified => {
                    // Acknowledge first; a change after this point signals again
                    subscription.reset();
                    let current = read_or_unavailable(self.store.as_ref(), &self.key, &self.value);
                    let event = ChangeEvent::new(self.key.to_string(), name.clone(), ChangeKind::ValueChanged)
                        .with_value(current);
                    self.alerts.emit(&event);
                    notifications += 1;
                    WatcherState::Armed
                }
                terminal => break terminal,
            };
        };

        // Releases the key and wait handles
        drop(subscription);

        info!("Key watcher {} exiting ({:?})", name, state);
        WatcherExit { state, notifications }
    }
}

pub struct WatcherHandle {
    name: String,
    worker: JoinHandle<WatcherExit>,
}

impl WatcherHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the thread; a panicked watcher reports `Failed`
    pub fn join(self) -> WatcherExit {
        self.worker.join().unwrap_or_else(|_| {
            error!("Key watcher {} panicked", self.name);
            WatcherExit {
                state: WatcherState::Failed,
                notifications: 0,
            }
        })
    }
}
