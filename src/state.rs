//! Previous-observation state.
//!
//! Snapshots are only replaced by the diff engine; everything else reads.
//! The registry map is a write-once baseline captured at startup. Key
//! watchers never update it and the report performs live reads instead.

use crate::fingerprint::FileRecord;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// All records observed for one target at one tick, ordered by path
pub type Snapshot = BTreeMap<PathBuf, FileRecord>;

#[derive(Debug, Default, Clone)]
pub struct StateStore {
    /// Target root → last snapshot
    files: HashMap<PathBuf, Snapshot>,

    /// Subkey → value name → value read at startup
    registry: BTreeMap<String, BTreeMap<String, String>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last snapshot recorded for `target`
    pub fn snapshot(&self, target: &Path) -> Option<&Snapshot> {
        self.files.get(target)
    }

    /// Swap in a new snapshot, returning the one it supersedes
    pub(crate) fn replace_snapshot(&mut self, target: &Path, snapshot: Snapshot) -> Option<Snapshot> {
        self.files.insert(target.to_path_buf(), snapshot)
    }

    /// Number of paths tracked across every target
    pub fn tracked_files(&self) -> usize {
        self.files.values().map(|s| s.len()).sum()
    }

    /// Record the startup value of a watched registry value
    pub fn seed_registry_value(&mut self, subkey: &str, value: &str, observed: String) {
        self.registry
            .entry(subkey.to_string())
            .or_default()
            .insert(value.to_string(), observed);
    }

    /// Values captured at startup
    pub fn registry_baseline(&self) -> &BTreeMap<String, BTreeMap<String, String>> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_snapshot_supersedes() {
        let mut store = StateStore::new();
        let root = Path::new("/watched");
        let path = root.join("a.txt");

        let mut first = Snapshot::new();
        first.insert(path.clone(), FileRecord::observe(&path, None));
        assert!(store.replace_snapshot(root, first).is_none());
        assert_eq!(store.tracked_files(), 1);

        let previous = store.replace_snapshot(root, Snapshot::new());
        assert_eq!(previous.map(|s| s.len()), Some(1));
        assert_eq!(store.tracked_files(), 0);
        assert!(store.snapshot(root).is_some_and(|s| s.is_empty()));
    }

    #[test]
    fn test_registry_baseline() {
        let mut store = StateStore::new();
        store.seed_registry_value("Software\\EDRTest", "TestValue", "N/A".to_string());
        assert_eq!(
            store.registry_baseline()["Software\\EDRTest"]["TestValue"],
            "N/A"
        );
    }
}
