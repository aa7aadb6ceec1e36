//! hostwatch: host change-detection agent.
//!
//! Polls a set of folders, diffs each scan against the previous snapshot and
//! alerts on new, modified and deleted files. Registry values are watched by
//! blocking key watchers. A JSON state report is written every cycle.

pub mod alert;
pub mod cli;
pub mod config;
pub mod diff;
pub mod discovery;
pub mod error;
pub mod event;
pub mod fingerprint;
pub mod keystore;
pub mod lister;
pub mod logsink;
pub mod report;
pub mod scanner;
pub mod service;
pub mod shutdown;
pub mod state;
pub mod watcher;

pub use alert::{AlertDispatcher, AlertHandle, ConsoleOptions, DesktopNotifier, Notifier, QueuedNotifier, SilentNotifier};
pub use config::{MonitorConfig, MonitorTarget, RegistryTarget};
pub use error::{MonitorError, MonitorResult};
pub use event::{ChangeEvent, ChangeKind};
pub use fingerprint::FileRecord;
pub use keystore::{KeyValueStore, RegistryKey, RegistryRoot};
pub use lister::{DirectoryLister, FsLister};
pub use report::{generate_report, JsonFileReport, Report, ReportSink};
pub use scanner::Scanner;
pub use service::{CycleReport, MonitorService};
pub use shutdown::ShutdownToken;
pub use state::{Snapshot, StateStore};
