//! Startup discovery of monitor targets.
//!
//! Candidates come from the current user's well-known folders and the
//! configured system folder list. Each one must pass the lister's access check;
//! failures are logged once and skipped, never fatal.

use crate::config::{MonitorConfig, MonitorTarget};
use crate::lister::DirectoryLister;
use directories::UserDirs;
use log::{debug, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub label: String,
}

impl Candidate {
    pub fn new(path: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Candidate {
            path: path.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Discovery {
    pub targets: Vec<MonitorTarget>,
    /// Candidates that failed the access check, with the reason
    pub skipped: Vec<(Candidate, String)>,
}

/// Folders the configuration asks for, before any probing
pub fn candidates(config: &MonitorConfig) -> Vec<Candidate> {
    let mut found = Vec::new();

    if config.include_user_folders {
        match UserDirs::new() {
            Some(dirs) => {
                let well_known: [(Option<&Path>, &str); 3] = [
                    (dirs.desktop_dir(), "Desktop"),
                    (dirs.document_dir(), "Documents"),
                    (dirs.download_dir(), "Downloads"),
                ];
                for (path, label) in well_known {
                    match path {
                        Some(path) => found.push(Candidate::new(path, label)),
                        None => debug!("No {} folder for this user", label),
                    }
                }
            }
            None => warn!("Could not resolve the user's home directory"),
        }
    }

    found.extend(
        config
            .system_folders
            .iter()
            .map(|path| Candidate::new(path.clone(), "System")),
    );

    found
}

/// Check every candidate and keep the accessible ones, first occurrence wins
pub fn discover(candidates: Vec<Candidate>, lister: &dyn DirectoryLister) -> Discovery {
    let mut discovery = Discovery::default();
    let mut seen = HashSet::new();

    for candidate in candidates {
        if !seen.insert(candidate.path.clone()) {
            debug!("Duplicate target ignored: {}", candidate.path.display());
            continue;
        }

        match lister.check_access(&candidate.path) {
            Ok(()) => {
                debug!("Target accepted: {} ({})", candidate.path.display(), candidate.label);
                discovery
                    .targets
                    .push(MonitorTarget::new(candidate.path.clone(), candidate.label.clone()));
            }
            Err(e) => {
                warn!("Skipping inaccessible folder {}: {}", candidate.path.display(), e);
                discovery.skipped.push((candidate, e.to_string()));
            }
        }
    }

    discovery
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lister::FsLister;
    use std::fs;
    use std::io;

    #[test]
    fn test_missing_folder_is_skipped() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let present = dir.path().join("present");
        fs::create_dir(&present)?;

        let found = discover(
            vec![
                Candidate::new(&present, "System"),
                Candidate::new(dir.path().join("absent"), "System"),
            ],
            &FsLister,
        );

        assert_eq!(found.targets, vec![MonitorTarget::new(&present, "System")]);
        assert_eq!(found.skipped.len(), 1);
        assert_eq!(found.skipped[0].0.path, dir.path().join("absent"));
        Ok(())
    }

    #[test]
    fn test_file_is_not_a_target() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("plain.txt");
        fs::write(&file, b"x")?;

        let found = discover(vec![Candidate::new(&file, "System")], &FsLister);
        assert!(found.targets.is_empty());
        assert_eq!(found.skipped.len(), 1);
        Ok(())
    }

    #[test]
    fn test_duplicates_collapse() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let found = discover(
            vec![
                Candidate::new(dir.path(), "Documents"),
                Candidate::new(dir.path(), "System"),
            ],
            &FsLister,
        );

        assert_eq!(found.targets.len(), 1);
        assert_eq!(found.targets[0].label, "Documents");
        Ok(())
    }

    #[test]
    fn test_candidates_without_user_folders() {
        let config = MonitorConfig {
            include_user_folders: false,
            ..MonitorConfig::default()
        };
        let found = candidates(&config);
        assert_eq!(found.len(), 5);
        assert!(found.iter().all(|c| c.label == "System"));
    }
}
