//! Directory enumeration capability.
//!
//! The scanner only ever talks to a [`DirectoryLister`]; [`FsLister`] is the
//! `std::fs` implementation used by the agent.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// One child of a listed directory
#[derive(Debug, Clone)]
pub struct ListedEntry {
    pub path: PathBuf,
    /// Also true for a symlink whose target is a directory
    pub is_dir: bool,
    pub is_symlink: bool,
    /// `None` when the entry's metadata could not be read
    pub modified: Option<SystemTime>,
}

pub trait DirectoryLister: Send + Sync {
    /// List the immediate children of `dir`
    fn list(&self, dir: &Path) -> io::Result<Vec<ListedEntry>>;

    /// Check that `dir` exists, is a directory and can be listed
    fn check_access(&self, dir: &Path) -> io::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FsLister;

impl DirectoryLister for FsLister {
    fn list(&self, dir: &Path) -> io::Result<Vec<ListedEntry>> {
        let mut entries = Vec::new();

        for entry_result in fs::read_dir(dir)? {
            let entry = match entry_result {
                Ok(entry) => entry,
                Err(_) => continue,
            };

            let file_type = entry.file_type().ok();
            let is_symlink = file_type.map(|t| t.is_symlink()).unwrap_or(false);
            // file_type() does not follow links; a link is a directory if its target is
            let is_dir = if is_symlink {
                fs::metadata(entry.path()).map(|m| m.is_dir()).unwrap_or(false)
            } else {
                file_type.map(|t| t.is_dir()).unwrap_or(false)
            };
            let modified = entry.metadata().and_then(|m| m.modified()).ok();

            entries.push(ListedEntry {
                path: entry.path(),
                is_dir,
                is_symlink,
                modified,
            });
        }

        Ok(entries)
    }

    fn check_access(&self, dir: &Path) -> io::Result<()> {
        let metadata = fs::metadata(dir)?;
        if !metadata.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{} is not a directory", dir.display()),
            ));
        }
        fs::read_dir(dir).map(|_| ())
    }
}
