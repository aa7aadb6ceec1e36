use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Target unreachable: {path}: {source}")]
    TargetUnreachable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to open key for notification: {0}")]
    KeyOpen(String),

    #[error("Failed to read key value: {0}")]
    KeyRead(String),

    #[error("Key notification error: {0}")]
    KeyNotify(String),

    #[error("Report error: {0}")]
    Report(#[from] serde_json::Error),

    #[error("Notification error: {0}")]
    Notify(String),

    #[error("Log sink error: {0}")]
    LogSink(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Startup failed: {0}")]
    Startup(String),
}

pub type MonitorResult<T> = Result<T, MonitorError>;
