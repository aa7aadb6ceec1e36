//! Alert dispatcher.
//!
//! A single thread owns the log sink, the console and the notifier. The
//! orchestrator and every key watcher hold an [`AlertHandle`] and send over
//! an unbounded channel, so raising an alert never blocks and lines never
//! interleave. The thread exits once every handle is dropped.

use crate::error::{MonitorError, MonitorResult};
use crate::event::ChangeEvent;
use crate::logsink::LogFile;
use colored::Colorize;
use crossbeam_channel::{self as channel, Receiver, Sender, TrySendError};
use log::{debug, error, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const ALERT_TITLE: &str = "Hostwatch Alert";

const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

enum Dispatch {
    Alert { target: String, message: String },
    Note(String),
    Flush(Sender<()>),
}

// ============================================================================
// Notifiers
// ============================================================================

/// User-visible notification channel (popup, sound, ...)
pub trait Notifier: Send {
    fn notify(&self, title: &str, message: &str) -> MonitorResult<()>;
}

/// Popups waiting to be shown; further alerts are dropped while it is full
pub const POPUP_QUEUE: usize = 4;

/// Hands notifications to one presenter thread through a bounded queue
///
/// `notify` never blocks: when the queue is full the notification is
/// dropped and reported as an error, which the dispatcher logs.
pub struct QueuedNotifier {
    tx: Sender<(String, String)>,
}

impl QueuedNotifier {
    pub fn spawn<F>(capacity: usize, mut present: F) -> MonitorResult<Self>
    where
        F: FnMut(&str, &str) + Send + 'static,
    {
        let (tx, rx) = channel::bounded::<(String, String)>(capacity);
        thread::Builder::new()
            .name("alert-popup".into())
            .spawn(move || {
                for (title, message) in rx.iter() {
                    present(&title, &message);
                }
            })?;
        Ok(QueuedNotifier { tx })
    }
}

impl Notifier for QueuedNotifier {
    fn notify(&self, title: &str, message: &str) -> MonitorResult<()> {
        match self.tx.try_send((title.to_string(), message.to_string())) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(MonitorError::Notify("popup queue full; notification dropped".to_string())),
            Err(TrySendError::Disconnected(_)) => Err(MonitorError::Notify("popup thread is gone".to_string())),
        }
    }
}

/// Popup plus two beeps on Windows
///
/// Popups are modal, so they are shown one at a time on a single presenter
/// thread behind a queue of [`POPUP_QUEUE`].
pub struct DesktopNotifier {
    queue: QueuedNotifier,
}

impl DesktopNotifier {
    pub fn spawn() -> MonitorResult<Self> {
        if !cfg!(windows) {
            return Err(MonitorError::Notify("desktop notifications require Windows".to_string()));
        }
        let queue = QueuedNotifier::spawn(POPUP_QUEUE, present_desktop)?;
        Ok(DesktopNotifier { queue })
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, title: &str, message: &str) -> MonitorResult<()> {
        self.queue.notify(title, message)
    }
}

fn present_desktop(title: &str, message: &str) {
    for _ in 0..2 {
        if let Err(e) = hostwatch_driver::notify::beep(1000, 500) {
            debug!("Beep failed: {}", e);
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }
    if let Err(e) = hostwatch_driver::notify::show_popup(title, message) {
        warn!("Popup failed: {}", e);
    }
}

/// Drops every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn notify(&self, _title: &str, _message: &str) -> MonitorResult<()> {
        Ok(())
    }
}

/// Keeps every notification in memory
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    seen: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<(String, String)> {
        self.seen.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, title: &str, message: &str) -> MonitorResult<()> {
        self.seen.lock().push((title.to_string(), message.to_string()));
        Ok(())
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Cheap, cloneable sender side of the dispatcher
#[derive(Clone)]
pub struct AlertHandle {
    tx: Sender<Dispatch>,
}

impl AlertHandle {
    /// Raise an alert about `target_label`
    pub fn alert(&self, message: &str, target_label: &str) {
        self.send(Dispatch::Alert {
            target: target_label.to_string(),
            message: message.to_string(),
        });
    }

    /// Raise an alert for a classified change
    pub fn emit(&self, event: &ChangeEvent) {
        self.alert(&event.message(), &event.target);
    }

    /// Append a plain line to the log sink
    pub fn note(&self, line: impl Into<String>) {
        self.send(Dispatch::Note(line.into()));
    }

    /// Wait until everything sent so far has been written
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = channel::bounded(1);
        self.send(Dispatch::Flush(ack_tx));
        if ack_rx.recv_timeout(FLUSH_TIMEOUT).is_err() {
            warn!("Alert dispatcher did not acknowledge flush");
        }
    }

    fn send(&self, message: Dispatch) {
        if self.tx.send(message).is_err() {
            error!("Alert dispatcher is gone; dropping message");
        }
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsoleOptions {
    pub enabled: bool,
    pub colored: bool,
}

/// Totals reported when the dispatcher thread exits
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherStats {
    pub alerts: usize,
    pub notes: usize,
    pub notification_failures: usize,
}

pub struct AlertDispatcher {
    log: LogFile,
    notifier: Box<dyn Notifier>,
    console: ConsoleOptions,
    stats: DispatcherStats,
}

impl AlertDispatcher {
    pub fn new(log: LogFile, notifier: Box<dyn Notifier>, console: ConsoleOptions) -> Self {
        AlertDispatcher {
            log,
            notifier,
            console,
            stats: DispatcherStats::default(),
        }
    }

    /// Start the dispatcher thread
    pub fn spawn(self) -> MonitorResult<(AlertHandle, JoinHandle<DispatcherStats>)> {
        let (tx, rx) = channel::unbounded();
        let worker = thread::Builder::new()
            .name("alert-dispatcher".into())
            .spawn(move || self.run(rx))?;
        Ok((AlertHandle { tx }, worker))
    }

    fn run(mut self, rx: Receiver<Dispatch>) -> DispatcherStats {
        for message in rx.iter() {
            match message {
                Dispatch::Alert { target, message } => self.handle_alert(&target, &message),
                Dispatch::Note(line) => {
                    self.stats.notes += 1;
                    self.log.append(&line);
                }
                Dispatch::Flush(ack) => {
                    self.log.flush();
                    let _ = ack.send(());
                }
            }
        }

        self.log.flush();
        self.stats
    }

    fn handle_alert(&mut self, target: &str, message: &str) {
        self.stats.alerts += 1;

        if self.console.enabled {
            self.print_banner(target, message);
        }
        self.log.append(&format!("[ALERT] {} ({})", message, target));

        match self.notifier.notify(ALERT_TITLE, message) {
            Ok(()) => self.log.append(&format!("[NOTIFICATION] {}: {}", ALERT_TITLE, message)),
            Err(e) => {
                self.stats.notification_failures += 1;
                debug!("Notification not shown: {}", e);
                self.log.append(&format!("[ERROR] Notification failed: {}", e));
            }
        }
    }

    fn print_banner(&self, target: &str, message: &str) {
        let rule = "******************************************";
        let heading = "*** ALERT! ALERT! ALERT! ***";
        if self.console.colored {
            println!("\n{}", rule.red());
            println!("{}", heading.red().bold());
            println!("*** Folder: {} ***", target.yellow());
            println!("*** {} ***", message.bold());
            println!("{}\n", rule.red());
        } else {
            println!("\n{}", rule);
            println!("{}", heading);
            println!("*** Folder: {} ***", target);
            println!("*** {} ***", message);
            println!("{}\n", rule);
        }
    }
}
