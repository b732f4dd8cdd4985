/// Moving files into their destination folders.
///
/// A same-volume move is a single `rename`. When source and destination live
/// on different volumes the file is copied into a hidden staging file next to
/// the destination, renamed into place, and only then removed from the source,
/// so a failed copy never costs the original.
///
/// Filesystem errors are translated into [`FailureReason`]s here and nowhere
/// else.
use crate::conflict::occupied;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Why a single file could not be organized.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "kebab-case")]
pub enum FailureReason {
    /// The file kept changing (or stayed locked) past the wait bound.
    #[error("file never stabilized")]
    NeverStabilized,
    #[error("permission denied")]
    PermissionDenied,
    #[error("disk full")]
    DiskFull,
    #[error("path too long")]
    PathTooLong,
    #[error("file is locked by another process")]
    FileLocked,
    /// The rename policy ran out of candidate names.
    #[error("no free destination name (namespace exhausted)")]
    NamespaceExhausted,
    /// Another writer took the destination name between resolution and move.
    #[error("destination name was taken by another writer")]
    DestinationTaken,
    /// The source disappeared before it could be moved.
    #[error("source file vanished")]
    SourceVanished,
    /// The engine stopped before this move finished.
    #[error("move interrupted by shutdown")]
    Interrupted,
    #[error("filesystem error: {0}")]
    Other(String),
}

/// Whether an existing file at the destination may be replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveMode {
    /// Fail with [`FailureReason::DestinationTaken`] if the destination exists.
    NoClobber,
    /// Replace the destination, atomically where the filesystem allows.
    Replace,
}

/// Result type for move operations.
pub type MoveResult<T> = Result<T, FailureReason>;

/// Performs moves with error translation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mover;

impl Mover {
    /// Moves `source` to `destination`, creating the destination's parent
    /// folders if needed.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use autotidy::mover::{MoveMode, Mover};
    /// use std::path::Path;
    ///
    /// let result = Mover::relocate(
    ///     Path::new("/home/user/Downloads/photo.jpg"),
    ///     Path::new("/home/user/Pictures/photo.jpg"),
    ///     MoveMode::NoClobber,
    /// );
    /// match result {
    ///     Ok(()) => println!("moved"),
    ///     Err(reason) => eprintln!("move failed: {}", reason),
    /// }
    /// ```
    pub fn relocate(source: &Path, destination: &Path, mode: MoveMode) -> MoveResult<()> {
        if let Some(parent) = destination.parent() {
            Self::ensure_folder(parent)?;
        }

        if mode == MoveMode::NoClobber && occupied(destination) {
            return Err(FailureReason::DestinationTaken);
        }

        match fs::rename(source, destination) {
            Ok(()) => {
                debug!(
                    source = %source.display(),
                    destination = %destination.display(),
                    "renamed"
                );
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                debug!(
                    source = %source.display(),
                    destination = %destination.display(),
                    "different volumes, falling back to copy"
                );
                Self::relocate_by_copy(source, destination, mode, |from, to| fs::copy(from, to))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound && !occupied(source) => {
                Err(FailureReason::SourceVanished)
            }
            Err(e) => Err(classify_io_error(&e)),
        }
    }

    /// Creates `folder` and its parents. Succeeds if it already exists.
    pub fn ensure_folder(folder: &Path) -> MoveResult<()> {
        fs::create_dir_all(folder).map_err(|e| classify_io_error(&e))
    }

    /// Copy-then-delete move used across volumes.
    ///
    /// `copy` writes the source into the staging path. If it fails, the
    /// staging file is removed and the source is left untouched.
    pub(crate) fn relocate_by_copy<F>(
        source: &Path,
        destination: &Path,
        mode: MoveMode,
        copy: F,
    ) -> MoveResult<()>
    where
        F: FnOnce(&Path, &Path) -> io::Result<u64>,
    {
        if !occupied(source) {
            return Err(FailureReason::SourceVanished);
        }

        let staging = staging_path(destination)?;
        if let Err(e) = copy(source, &staging) {
            discard(&staging);
            return Err(classify_io_error(&e));
        }

        if mode == MoveMode::NoClobber && occupied(destination) {
            discard(&staging);
            return Err(FailureReason::DestinationTaken);
        }

        if let Err(e) = fs::rename(&staging, destination) {
            discard(&staging);
            return Err(classify_io_error(&e));
        }

        if let Err(e) = fs::remove_file(source) {
            // Keep a single copy: roll back unless an existing file was
            // already replaced.
            if mode == MoveMode::NoClobber {
                discard(destination);
            }
            warn!(
                source = %source.display(),
                error = %e,
                "copied file but could not remove the original"
            );
            return Err(classify_io_error(&e));
        }

        Ok(())
    }
}

/// Maps an I/O error onto a [`FailureReason`].
pub fn classify_io_error(error: &io::Error) -> FailureReason {
    if let Some(code) = error.raw_os_error() {
        if is_name_too_long(code) {
            return FailureReason::PathTooLong;
        }
        if is_lock_violation(code) {
            return FailureReason::FileLocked;
        }
    }

    match error.kind() {
        io::ErrorKind::PermissionDenied => FailureReason::PermissionDenied,
        io::ErrorKind::StorageFull => FailureReason::DiskFull,
        io::ErrorKind::ResourceBusy => FailureReason::FileLocked,
        _ => FailureReason::Other(error.to_string()),
    }
}

fn is_name_too_long(code: i32) -> bool {
    if cfg!(windows) {
        // ERROR_FILENAME_EXCED_RANGE
        code == 206
    } else if cfg!(any(target_os = "linux", target_os = "android")) {
        code == 36
    } else if cfg!(unix) {
        code == 63
    } else {
        false
    }
}

fn is_lock_violation(code: i32) -> bool {
    if cfg!(windows) {
        // ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION
        code == 32 || code == 33
    } else if cfg!(any(target_os = "linux", target_os = "android")) {
        // ETXTBSY
        code == 26
    } else {
        false
    }
}

fn staging_path(destination: &Path) -> MoveResult<PathBuf> {
    let name = destination
        .file_name()
        .ok_or_else(|| FailureReason::Other("destination has no file name".to_string()))?;
    Ok(destination.with_file_name(format!(
        ".{}.autotidy-partial",
        name.to_string_lossy()
    )))
}

fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path)
        && e.kind() != io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "could not remove leftover file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("report.pdf");
        fs::write(&source, "report contents").expect("Failed to write test file");
        (temp_dir, source)
    }

    #[test]
    fn test_relocate_creates_missing_folders() {
        let (temp_dir, source) = setup();
        let destination = temp_dir.path().join("docs").join("2024").join("report.pdf");

        Mover::relocate(&source, &destination, MoveMode::NoClobber).expect("Failed to move");

        assert!(!source.exists());
        assert_eq!(
            fs::read_to_string(&destination).unwrap(),
            "report contents"
        );
    }

    #[test]
    fn test_relocate_no_clobber_refuses_existing_destination() {
        let (temp_dir, source) = setup();
        let destination = temp_dir.path().join("taken.pdf");
        fs::write(&destination, "older").unwrap();

        assert_eq!(
            Mover::relocate(&source, &destination, MoveMode::NoClobber),
            Err(FailureReason::DestinationTaken)
        );
        assert!(source.exists());
        assert_eq!(fs::read_to_string(&destination).unwrap(), "older");
    }

    #[test]
    fn test_relocate_replace_overwrites_destination() {
        let (temp_dir, source) = setup();
        let destination = temp_dir.path().join("taken.pdf");
        fs::write(&destination, "older").unwrap();

        Mover::relocate(&source, &destination, MoveMode::Replace).expect("Failed to move");
        assert!(!source.exists());
        assert_eq!(
            fs::read_to_string(&destination).unwrap(),
            "report contents"
        );
    }

    #[test]
    fn test_relocate_missing_source_reports_vanished() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let result = Mover::relocate(
            &temp_dir.path().join("missing.pdf"),
            &temp_dir.path().join("out").join("missing.pdf"),
            MoveMode::NoClobber,
        );
        assert_eq!(result, Err(FailureReason::SourceVanished));
    }

    #[test]
    fn test_copy_fallback_moves_file() {
        let (temp_dir, source) = setup();
        let destination = temp_dir.path().join("other").join("report.pdf");
        Mover::ensure_folder(destination.parent().unwrap()).unwrap();

        Mover::relocate_by_copy(&source, &destination, MoveMode::NoClobber, |from, to| {
            fs::copy(from, to)
        })
        .expect("Failed to move by copy");

        assert!(!source.exists());
        assert_eq!(
            fs::read_to_string(&destination).unwrap(),
            "report contents"
        );
        assert_eq!(fs::read_dir(destination.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn test_copy_fallback_disk_full_keeps_source_and_removes_partial() {
        let (temp_dir, source) = setup();
        let folder = temp_dir.path().join("other");
        Mover::ensure_folder(&folder).unwrap();
        let destination = folder.join("report.pdf");

        let result = Mover::relocate_by_copy(&source, &destination, MoveMode::NoClobber, |_, to| {
            let mut partial = fs::File::create(to)?;
            partial.write_all(b"repo")?;
            Err(io::Error::from(io::ErrorKind::StorageFull))
        });

        assert_eq!(result, Err(FailureReason::DiskFull));
        assert_eq!(fs::read_to_string(&source).unwrap(), "report contents");
        assert!(!destination.exists());
        assert_eq!(fs::read_dir(&folder).unwrap().count(), 0);
    }

    #[test]
    fn test_copy_fallback_no_clobber_keeps_existing_destination() {
        let (temp_dir, source) = setup();
        let destination = temp_dir.path().join("taken.pdf");
        fs::write(&destination, "older").unwrap();

        let result = Mover::relocate_by_copy(&source, &destination, MoveMode::NoClobber, |from, to| {
            fs::copy(from, to)
        });

        assert_eq!(result, Err(FailureReason::DestinationTaken));
        assert!(source.exists());
        assert_eq!(fs::read_to_string(&destination).unwrap(), "older");
        assert!(!temp_dir.path().join(".taken.pdf.autotidy-partial").exists());
    }

    #[test]
    fn test_classify_io_error() {
        assert_eq!(
            classify_io_error(&io::Error::from(io::ErrorKind::PermissionDenied)),
            FailureReason::PermissionDenied
        );
        assert_eq!(
            classify_io_error(&io::Error::from(io::ErrorKind::StorageFull)),
            FailureReason::DiskFull
        );
        assert_eq!(
            classify_io_error(&io::Error::from(io::ErrorKind::ResourceBusy)),
            FailureReason::FileLocked
        );
        assert!(matches!(
            classify_io_error(&io::Error::other("boom")),
            FailureReason::Other(message) if message.contains("boom")
        ));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_classify_raw_os_errors_on_linux() {
        assert_eq!(
            classify_io_error(&io::Error::from_raw_os_error(36)),
            FailureReason::PathTooLong
        );
        assert_eq!(
            classify_io_error(&io::Error::from_raw_os_error(28)),
            FailureReason::DiskFull
        );
    }

    #[test]
    fn test_failure_reason_serializes_with_tag() {
        let json = serde_json::to_value(FailureReason::Other("boom".to_string())).unwrap();
        assert_eq!(json["reason"], "other");
        assert_eq!(json["detail"], "boom");
        let json = serde_json::to_value(FailureReason::DiskFull).unwrap();
        assert_eq!(json["reason"], "disk-full");
    }
}
