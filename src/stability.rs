//! Readiness checks for files that may still be written by another process.
//!
//! A file is ready once two samples taken at least one quiescence interval
//! apart agree on size and modification time and the file can be opened for
//! reading. On Windows the open requests exclusive sharing, so a file still
//! held by a writer is reported as busy.

use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::time::{Duration, Instant, SystemTime};
use tracing::debug;

/// Default time a file's size and mtime must hold still.
pub const DEFAULT_QUIESCENCE: Duration = Duration::from_millis(1500);
/// Default bound after which a file that never settles is abandoned.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(30);

/// One sample of a file's size and modification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub sampled_at: Instant,
}

impl Observation {
    fn same_content_as(&self, other: &Observation) -> bool {
        self.size == other.size && self.modified == other.modified
    }
}

/// Result of checking a file against the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Size and mtime held still for the quiescence interval and the file is
    /// accessible.
    Stable(Observation),
    /// Not ready yet; carry this observation into the next check.
    Settling(Observation),
    /// The file could not be inspected or opened right now; keep the previous
    /// observation.
    Busy,
    /// The path no longer exists.
    Vanished,
    /// The path exists but is not a regular file.
    NotAFile,
}

/// Decides whether a newly observed file has finished being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityGate {
    quiescence: Duration,
    max_wait: Duration,
}

impl Default for StabilityGate {
    fn default() -> Self {
        Self::new(DEFAULT_QUIESCENCE, DEFAULT_MAX_WAIT)
    }
}

impl StabilityGate {
    pub fn new(quiescence: Duration, max_wait: Duration) -> Self {
        Self {
            quiescence,
            max_wait,
        }
    }

    /// Samples `path` and compares it with the previous observation.
    ///
    /// Never sleeps: callers schedule the next check, usually one quiescence
    /// interval later.
    pub fn is_stable(&self, path: &Path, previous: Option<&Observation>) -> Verdict {
        self.check_at(path, previous, Instant::now())
    }

    /// True once an entry first seen at `first_observed` has waited longer
    /// than the configured bound.
    pub fn deadline_passed(&self, first_observed: Instant, now: Instant) -> bool {
        now.saturating_duration_since(first_observed) >= self.max_wait
    }

    pub(crate) fn check_at(
        &self,
        path: &Path,
        previous: Option<&Observation>,
        now: Instant,
    ) -> Verdict {
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Verdict::Vanished,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "could not stat pending file");
                return Verdict::Busy;
            }
        };

        if !metadata.is_file() {
            return Verdict::NotAFile;
        }

        let current = Observation {
            size: metadata.len(),
            modified: metadata.modified().ok(),
            sampled_at: now,
        };

        let Some(previous) = previous else {
            return Verdict::Settling(current);
        };

        if !previous.same_content_as(&current) {
            debug!(
                path = %path.display(),
                size = current.size,
                "file still changing"
            );
            return Verdict::Settling(current);
        }

        // Unchanged, but not for long enough: keep the older sample so the
        // quiet period is measured from it.
        if now.saturating_duration_since(previous.sampled_at) < self.quiescence {
            return Verdict::Settling(*previous);
        }

        match open_exclusive(path) {
            Ok(_) => Verdict::Stable(current),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Verdict::Vanished,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "file still held by another process");
                Verdict::Busy
            }
        }
    }
}

#[cfg(windows)]
fn open_exclusive(path: &Path) -> io::Result<File> {
    use std::fs::OpenOptions;
    use std::os::windows::fs::OpenOptionsExt;

    OpenOptions::new().read(true).share_mode(0).open(path)
}

#[cfg(not(windows))]
fn open_exclusive(path: &Path) -> io::Result<File> {
    File::open(path)
}
