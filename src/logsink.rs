//! Durable append-only log file.
//!
//! Every line is timestamped. A failed write drops the handle and reports
//! through `log::error!`; the next line re-opens the file.

use crate::error::{MonitorError, MonitorResult};
use chrono::Local;
use log::{error, info};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct LogFile {
    path: PathBuf,
    file: Option<File>,
}

impl LogFile {
    /// Open `path` for appending, creating parent directories
    pub fn open(path: &Path) -> MonitorResult<Self> {
        let file = Self::open_append(path)
            .map_err(|e| MonitorError::LogSink(format!("{}: {}", path.display(), e)))?;

        Ok(LogFile {
            path: path.to_path_buf(),
            file: Some(file),
        })
    }

    fn open_append(path: &Path) -> std::io::Result<File> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Append one timestamped line; never fails the caller
    pub fn append(&mut self, line: &str) {
        if self.file.is_none() && !self.reopen() {
            return;
        }

        if let Some(file) = self.file.as_mut() {
            if let Err(e) = writeln!(file, "[{}] {}", timestamp(), line) {
                error!("Log sink write failed ({}): {}", self.path.display(), e);
                self.file = None;
            }
        }
    }

    pub fn flush(&mut self) {
        if let Some(file) = self.file.as_mut() {
            if let Err(e) = file.flush() {
                error!("Log sink flush failed ({}): {}", self.path.display(), e);
                self.file = None;
            }
        }
    }

    /// Drop the current handle; the next append re-opens
    pub fn invalidate(&mut self) {
        self.file = None;
    }

    fn reopen(&mut self) -> bool {
        match Self::open_append(&self.path) {
            Ok(mut file) => {
                info!("Log file reopened: {}", self.path.display());
                let _ = writeln!(file, "[{}] [*] Log file reopened", timestamp());
                self.file = Some(file);
                true
            }
            Err(e) => {
                error!("Could not reopen log file {}: {}", self.path.display(), e);
                false
            }
        }
    }
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
