//! Recursive directory snapshot scanner.
//!
//! Walks a target root depth-first through a [`DirectoryLister`] and returns
//! every leaf file with its modification time. Directories are traversed, not
//! reported. A subdirectory that cannot be listed is recorded as a
//! [`ScanIssue`] and skipped; only a failure on the root itself aborts the scan.

use crate::error::{MonitorError, MonitorResult};
use crate::lister::DirectoryLister;
use log::debug;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanIssueKind {
    AccessDenied,
    PathNotFound,
    ResourceExhausted,
    Other,
}

impl ScanIssueKind {
    fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => ScanIssueKind::AccessDenied,
            io::ErrorKind::NotFound => ScanIssueKind::PathNotFound,
            io::ErrorKind::OutOfMemory => ScanIssueKind::ResourceExhausted,
            _ => ScanIssueKind::Other,
        }
    }
}

/// A subtree the scanner had to skip
#[derive(Debug, Clone)]
pub struct ScanIssue {
    pub path: PathBuf,
    pub kind: ScanIssueKind,
    pub message: String,
}

/// Result of scanning one root
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    /// Leaf file → modification time (`None` if its stat failed)
    pub files: BTreeMap<PathBuf, Option<SystemTime>>,
    pub issues: Vec<ScanIssue>,
    pub directories: usize,
}

/// Stateless scanner; one instance can scan any number of roots
#[derive(Clone)]
pub struct Scanner {
    lister: Arc<dyn DirectoryLister>,
    excludes: Vec<String>,
}

impl Scanner {
    pub fn new(lister: Arc<dyn DirectoryLister>, excludes: Vec<String>) -> Self {
        Scanner { lister, excludes }
    }

    pub fn lister(&self) -> &Arc<dyn DirectoryLister> {
        &self.lister
    }

    /// Scan `root` recursively
    pub fn scan(&self, root: &Path) -> MonitorResult<ScanOutcome> {
        let mut outcome = ScanOutcome::default();

        // Root failures are reported to the caller, not swallowed.
        let root_entries = self
            .lister
            .list(root)
            .map_err(|source| MonitorError::TargetUnreachable {
                path: root.to_path_buf(),
                source,
            })?;
        outcome.directories += 1;

        let mut stack: Vec<PathBuf> = Vec::new();
        self.absorb(root_entries, &mut stack, &mut outcome);

        while let Some(dir) = stack.pop() {
            match self.lister.list(&dir) {
                Ok(entries) => {
                    outcome.directories += 1;
                    self.absorb(entries, &mut stack, &mut outcome);
                }
                Err(err) => {
                    let kind = ScanIssueKind::from_io(&err);
                    debug!("Skipping {} ({:?}): {}", dir.display(), kind, err);
                    outcome.issues.push(ScanIssue {
                        path: dir,
                        kind,
                        message: err.to_string(),
                    });
                }
            }
        }

        Ok(outcome)
    }

    fn absorb(
        &self,
        entries: Vec<crate::lister::ListedEntry>,
        stack: &mut Vec<PathBuf>,
        outcome: &mut ScanOutcome,
    ) {
        for entry in entries {
            if should_skip(&entry.path, &self.excludes) {
                continue;
            }

            // Symlinked directories are neither followed nor reported
            if entry.is_dir && !entry.is_symlink {
                stack.push(entry.path);
            } else if !entry.is_dir {
                outcome.files.insert(entry.path, entry.modified);
            }
        }
    }
}

/// Exclusions without a separator match a file or directory name
/// (case-insensitive); others match as a path prefix.
fn should_skip(path: &Path, excludes: &[String]) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();

    excludes.iter().any(|skip| {
        if skip.contains('/') || skip.contains('\\') {
            path.starts_with(skip)
        } else {
            name.eq_ignore_ascii_case(skip)
        }
    })
}
