use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Classification of an observed change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ChangeKind {
    New,
    Modified,
    Deleted,
    ValueChanged,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ChangeKind::New => "New file detected",
            ChangeKind::Modified => "File modified",
            ChangeKind::Deleted => "File deleted",
            ChangeKind::ValueChanged => "Registry value changed",
        };
        f.write_str(text)
    }
}

/// A classified observation on its way to the alert dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    /// Target root or registry subkey the change belongs to
    pub target: String,
    /// File path, or `subkey\value` for registry changes
    pub subject: String,
    pub kind: ChangeKind,
    /// Freshly read value for `ValueChanged`
    pub value: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(target: impl Into<String>, subject: impl Into<String>, kind: ChangeKind) -> Self {
        ChangeEvent {
            target: target.into(),
            subject: subject.into(),
            kind,
            value: None,
            observed_at: Utc::now(),
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// One-line human readable description
    pub fn message(&self) -> String {
        match &self.value {
            Some(value) => format!("{}: {} - New value: {}", self.kind, self.subject, value),
            None => format!("{}: {}", self.kind, self.subject),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let event = ChangeEvent::new("C:\\Users\\Public", "C:\\Users\\Public\\a.txt", ChangeKind::New);
        assert_eq!(event.message(), "New file detected: C:\\Users\\Public\\a.txt");

        let event = ChangeEvent::new("Run", "Run\\X", ChangeKind::ValueChanged).with_value("C:\\app.exe");
        assert_eq!(event.message(), "Registry value changed: Run\\X - New value: C:\\app.exe");
    }
}
