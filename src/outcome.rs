//! Terminal results reported once per organized file.

use crate::mover::FailureReason;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// What happened to a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "failure", rename_all = "kebab-case")]
pub enum OutcomeKind {
    Moved,
    /// The destination name was taken and the policy is skip.
    SkippedDuplicate,
    /// No category matched and there is no fallback folder.
    SkippedUnmatched,
    Failed(FailureReason),
}

/// The result of processing one file, published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveOutcome {
    pub source: PathBuf,
    /// Where the file now lives. Set only for [`OutcomeKind::Moved`].
    pub destination: Option<PathBuf>,
    pub category: Option<String>,
    #[serde(flatten)]
    pub result: OutcomeKind,
    pub finished_at: DateTime<Utc>,
}

impl MoveOutcome {
    fn new(
        source: &Path,
        destination: Option<PathBuf>,
        category: Option<String>,
        result: OutcomeKind,
    ) -> Self {
        Self {
            source: source.to_path_buf(),
            destination,
            category,
            result,
            finished_at: Utc::now(),
        }
    }

    pub fn moved(source: &Path, destination: PathBuf, category: impl Into<String>) -> Self {
        Self::new(
            source,
            Some(destination),
            Some(category.into()),
            OutcomeKind::Moved,
        )
    }

    pub fn skipped_duplicate(source: &Path, category: impl Into<String>) -> Self {
        Self::new(
            source,
            None,
            Some(category.into()),
            OutcomeKind::SkippedDuplicate,
        )
    }

    pub fn skipped_unmatched(source: &Path) -> Self {
        Self::new(source, None, None, OutcomeKind::SkippedUnmatched)
    }

    pub fn failed(source: &Path, category: Option<String>, reason: FailureReason) -> Self {
        Self::new(source, None, category, OutcomeKind::Failed(reason))
    }

    /// The failure reason, if this outcome is a failure.
    pub fn failure(&self) -> Option<&FailureReason> {
        match &self.result {
            OutcomeKind::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn is_moved(&self) -> bool {
        self.result == OutcomeKind::Moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moved_outcome_json_shape() {
        let outcome = MoveOutcome::moved(
            Path::new("/dl/a.jpg"),
            PathBuf::from("/dl/img/a.jpg"),
            "Images",
        );
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["result"], "moved");
        assert_eq!(json["source"], "/dl/a.jpg");
        assert_eq!(json["destination"], "/dl/img/a.jpg");
        assert_eq!(json["category"], "Images");
        assert!(json.get("failure").is_none());
        assert!(json["finished_at"].is_string());
    }

    #[test]
    fn test_failed_outcome_carries_reason() {
        let outcome = MoveOutcome::failed(
            Path::new("/dl/big.iso"),
            Some("Archives".to_string()),
            FailureReason::DiskFull,
        );
        assert_eq!(outcome.failure(), Some(&FailureReason::DiskFull));
        assert!(!outcome.is_moved());

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["result"], "failed");
        assert_eq!(json["failure"]["reason"], "disk-full");
        assert!(json["destination"].is_null());
    }

    #[test]
    fn test_skipped_outcomes() {
        let unmatched = MoveOutcome::skipped_unmatched(Path::new("/dl/README"));
        assert_eq!(unmatched.result, OutcomeKind::SkippedUnmatched);
        assert_eq!(unmatched.category, None);
        assert_eq!(unmatched.failure(), None);

        let duplicate = MoveOutcome::skipped_duplicate(Path::new("/dl/a.jpg"), "Images");
        let json = serde_json::to_value(&duplicate).unwrap();
        assert_eq!(json["result"], "skipped-duplicate");
    }
}
