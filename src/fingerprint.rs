//! Coarse per-path records.
//!
//! A [`FileRecord`] is derived from a path and its modification time only.
//! The fingerprint is NOT a content hash: an edit that lands within the same
//! second and leaves the timestamp untouched produces an identical record and
//! goes undetected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// `last_modified` value for a path observed as absent or inaccessible
pub const MISSING_TIMESTAMP: &str = "File not found";

/// Fingerprint returned when there is no timestamp to derive one from
pub const MISSING_FINGERPRINT: &str = "0000000000000000";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One observation of one path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: PathBuf,
    pub last_modified: String,
    pub exists: bool,
    pub fingerprint: String,
}

impl FileRecord {
    /// Build a record from the modification time reported by the lister
    ///
    /// `None` means the stat failed; the path is recorded as not existing for
    /// this cycle and will be looked at again on the next one.
    pub fn observe(path: &Path, modified: Option<SystemTime>) -> Self {
        match modified {
            Some(time) => {
                let last_modified = format_timestamp(time);
                let fingerprint = fingerprint(path, Some(&last_modified));
                FileRecord {
                    path: path.to_path_buf(),
                    last_modified,
                    exists: true,
                    fingerprint,
                }
            }
            None => FileRecord {
                path: path.to_path_buf(),
                last_modified: MISSING_TIMESTAMP.to_string(),
                exists: false,
                fingerprint: MISSING_FINGERPRINT.to_string(),
            },
        }
    }

    /// Whether `other` differs in timestamp or fingerprint
    pub fn differs_from(&self, other: &FileRecord) -> bool {
        self.last_modified != other.last_modified || self.fingerprint != other.fingerprint
    }
}

/// Identity fingerprint of `path` at `last_modified`
///
/// Pure and deterministic; never touches the filesystem. The value is the
/// first 8 bytes of a BLAKE3 digest, so it is stable across builds and can
/// be compared with fingerprints from earlier reports.
pub fn fingerprint(path: &Path, last_modified: Option<&str>) -> String {
    let Some(stamp) = last_modified else {
        return MISSING_FINGERPRINT.to_string();
    };

    let mut hasher = blake3::Hasher::new();
    hasher.update(path.to_string_lossy().as_bytes());
    hasher.update(&[0]);
    hasher.update(stamp.as_bytes());
    hasher.finalize().to_hex().as_str()[..16].to_string()
}

/// Render a modification time at one-second granularity (UTC)
pub fn format_timestamp(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_fingerprint_is_deterministic() {
        let path = Path::new("C:\\Users\\Public\\a.txt");
        let a = fingerprint(path, Some("2024-01-01 10:00:00"));
        let b = fingerprint(path, Some("2024-01-01 10:00:00"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_fingerprint_is_a_digest_prefix() {
        let digest = blake3::hash(b"a.txt\x002024-01-01 10:00:00");
        let hex = digest.to_hex();
        let expected = &hex.as_str()[..16];
        assert_eq!(fingerprint(Path::new("a.txt"), Some("2024-01-01 10:00:00")), expected);
    }

    #[test]
    fn test_fingerprint_tracks_path_and_timestamp() {
        let base = fingerprint(Path::new("a.txt"), Some("2024-01-01 10:00:00"));
        assert_ne!(base, fingerprint(Path::new("b.txt"), Some("2024-01-01 10:00:00")));
        assert_ne!(base, fingerprint(Path::new("a.txt"), Some("2024-01-01 10:00:01")));
    }

    #[test]
    fn test_missing_timestamp_yields_sentinel() {
        assert_eq!(fingerprint(Path::new("a.txt"), None), MISSING_FINGERPRINT);

        let record = FileRecord::observe(Path::new("gone.txt"), None);
        assert!(!record.exists);
        assert_eq!(record.last_modified, MISSING_TIMESTAMP);
        assert_eq!(record.fingerprint, MISSING_FINGERPRINT);
    }

    #[test]
    fn test_sub_second_edits_are_invisible() {
        // Known gap: same second, same record.
        let t0 = UNIX_EPOCH + Duration::from_millis(1_700_000_000_100);
        let t1 = UNIX_EPOCH + Duration::from_millis(1_700_000_000_900);
        let a = FileRecord::observe(Path::new("x"), Some(t0));
        let b = FileRecord::observe(Path::new("x"), Some(t1));
        assert!(!a.differs_from(&b));

        let c = FileRecord::observe(Path::new("x"), Some(t1 + Duration::from_secs(1)));
        assert!(a.differs_from(&c));
    }

    #[test]
    fn test_format_timestamp() {
        let time = UNIX_EPOCH + Duration::from_secs(86_400);
        assert_eq!(format_timestamp(time), "1970-01-02 00:00:00");
    }
}
