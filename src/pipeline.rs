//! Classify, resolve and move one stable file.
//!
//! Runs on blocking threads. Resolution and the move that follows it happen
//! under a per-destination-folder lock, so two files that would land on the
//! same disambiguated name never both claim it.

use crate::category_rules::{CategoryRules, Classification};
use crate::conflict::{ConflictError, ConflictResolver, Resolution};
use crate::mover::{FailureReason, MoveMode, Mover};
use crate::outcome::MoveOutcome;
use crate::watch_config::{FALLBACK_CATEGORY, WatchConfig};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Times a destination may be re-resolved after losing it to another writer.
const CLAIM_RETRIES: usize = 3;

#[derive(Debug)]
pub(crate) struct Pipeline {
    rules: CategoryRules,
    resolver: ConflictResolver,
    fallback: Option<PathBuf>,
    folder_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl Pipeline {
    pub(crate) fn new(config: &WatchConfig) -> Self {
        Self {
            rules: config.rules.clone(),
            resolver: config.resolver(),
            fallback: config.fallback.clone(),
            folder_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Organizes `source`. Returns `None` if the file vanished before it
    /// could be moved.
    pub(crate) fn process(&self, source: &Path) -> Option<MoveOutcome> {
        let Some(filename) = source.file_name() else {
            return Some(MoveOutcome::failed(
                source,
                None,
                FailureReason::Other("path has no file name".to_string()),
            ));
        };
        let Some(filename) = filename.to_str() else {
            return Some(MoveOutcome::failed(
                source,
                None,
                FailureReason::Other("file name is not valid UTF-8".to_string()),
            ));
        };

        let (category, folder) = match self.rules.classify(filename) {
            Classification::Matched {
                category,
                destination,
            } => (category.to_string(), destination.to_path_buf()),
            Classification::Unmatched => match &self.fallback {
                Some(fallback) => (FALLBACK_CATEGORY.to_string(), fallback.clone()),
                None => return Some(MoveOutcome::skipped_unmatched(source)),
            },
        };

        let lock = self.folder_lock(&folder);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        for _ in 0..CLAIM_RETRIES {
            let resolution = match self.resolver.resolve(&folder, filename) {
                Ok(resolution) => resolution,
                Err(ConflictError::NamespaceExhausted { .. }) => {
                    return Some(MoveOutcome::failed(
                        source,
                        Some(category),
                        FailureReason::NamespaceExhausted,
                    ));
                }
                Err(e) => {
                    return Some(MoveOutcome::failed(
                        source,
                        Some(category),
                        FailureReason::Other(e.to_string()),
                    ));
                }
            };

            let (destination, mode) = match resolution {
                Resolution::Skip => {
                    return Some(MoveOutcome::skipped_duplicate(source, category));
                }
                Resolution::Replace(path) => (path, MoveMode::Replace),
                Resolution::Free(path) | Resolution::Renamed(path) => (path, MoveMode::NoClobber),
            };

            match Mover::relocate(source, &destination, mode) {
                Ok(()) => return Some(MoveOutcome::moved(source, destination, category)),
                Err(FailureReason::DestinationTaken) => {
                    debug!(
                        destination = %destination.display(),
                        "destination claimed by another writer, resolving again"
                    );
                }
                Err(FailureReason::SourceVanished) => return None,
                Err(reason) => return Some(MoveOutcome::failed(source, Some(category), reason)),
            }
        }

        Some(MoveOutcome::failed(
            source,
            Some(category),
            FailureReason::DestinationTaken,
        ))
    }

    fn folder_lock(&self, folder: &Path) -> Arc<Mutex<()>> {
        let key = lock_key(folder);
        let mut locks = self
            .folder_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(key).or_default())
    }
}

/// Resolves aliases of one directory to a single lock key.
///
/// A folder that does not exist yet is keyed by its canonical parent.
fn lock_key(folder: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(folder) {
        return canonical;
    }
    match (folder.parent(), folder.file_name()) {
        (Some(parent), Some(name)) => fs::canonicalize(parent)
            .map(|parent| parent.join(name))
            .unwrap_or_else(|_| folder.to_path_buf()),
        _ => folder.to_path_buf(),
    }
}
