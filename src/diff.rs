//! Snapshot diff engine.
//!
//! Classifies a fresh scan against the stored snapshot of the same target
//! and replaces that snapshot. The classification works on the prior snapshot
//! taken out of the store and a new one built locally; the store only ever
//! holds one or the other, never a half-updated mix.

use crate::config::MonitorTarget;
use crate::event::{ChangeEvent, ChangeKind};
use crate::fingerprint::FileRecord;
use crate::scanner::ScanOutcome;
use crate::state::{Snapshot, StateStore};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::SystemTime;

/// A single path classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// Build the current snapshot and classify it against `prior`
///
/// Emission order: New/Modified in path order, then Deleted in path order.
pub fn classify(prior: &Snapshot, current: &BTreeMap<PathBuf, Option<SystemTime>>) -> (Snapshot, Vec<Change>) {
    let mut next = Snapshot::new();
    let mut changes = Vec::new();

    for (path, modified) in current {
        let record = FileRecord::observe(path, *modified);

        match prior.get(path) {
            None => changes.push(Change { path: path.clone(), kind: ChangeKind::New }),
            Some(previous) if record.differs_from(previous) => {
                changes.push(Change { path: path.clone(), kind: ChangeKind::Modified })
            }
            Some(_) => {}
        }

        next.insert(path.clone(), record);
    }

    for path in prior.keys() {
        if !current.contains_key(path) {
            changes.push(Change { path: path.clone(), kind: ChangeKind::Deleted });
        }
    }

    (next, changes)
}

/// Diff `scan` against the stored snapshot for `target` and store the result
pub fn diff(store: &mut StateStore, target: &MonitorTarget, scan: &ScanOutcome) -> Vec<ChangeEvent> {
    let empty = Snapshot::new();
    let prior = store.snapshot(&target.path).unwrap_or(&empty);
    let (next, changes) = classify(prior, &scan.files);

    store.replace_snapshot(&target.path, next);

    let label = target.path.display().to_string();
    changes
        .into_iter()
        .map(|change| ChangeEvent::new(label.clone(), change.path.display().to_string(), change.kind))
        .collect()
}

/// Record the initial snapshot without emitting anything
pub fn seed(store: &mut StateStore, target: &MonitorTarget, scan: &ScanOutcome) -> usize {
    let (next, _) = classify(&Snapshot::new(), &scan.files);
    let count = next.len();
    store.replace_snapshot(&target.path, next);
    count
}
