//! The immutable configuration of one monitoring session.

use crate::category_rules::{CategoryRules, ExtensionConflict};
use crate::conflict::{
    ConflictResolver, DEFAULT_MAX_RENAME_ATTEMPTS, DuplicatePolicy, RenameTemplate,
};
use crate::filters::IgnoreRules;
use crate::stability::{DEFAULT_MAX_WAIT, DEFAULT_QUIESCENCE, StabilityGate};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// How often pending files are re-checked by default.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// How long `stop` waits for in-flight moves by default.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);
/// Default capacity of the filesystem event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Category name reported for files sent to the fallback folder.
pub const FALLBACK_CATEGORY: &str = "Others";

/// A configuration the engine refuses to run with.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvalidConfig {
    #[error("category '{category}' points at the watched folder itself")]
    DestinationIsSource { category: String },
    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,
    #[error("event channel capacity must be greater than zero")]
    ZeroEventCapacity,
}

/// Everything one session of the engine needs.
///
/// Built by the host, handed to `WatcherEngine::start` by value and never
/// changed while the session runs.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Folder whose direct children are organized.
    pub source: PathBuf,
    pub rules: CategoryRules,
    pub duplicate_policy: DuplicatePolicy,
    /// Folder for files no rule matches. `None` leaves them in place.
    pub fallback: Option<PathBuf>,
    pub rename_template: RenameTemplate,
    pub max_rename_attempts: u32,
    /// How long size and mtime must hold still.
    pub quiescence: Duration,
    pub poll_interval: Duration,
    /// Files that never settle are failed after this long.
    pub max_wait: Duration,
    pub stop_grace: Duration,
    /// Register files already present in `source` at start.
    pub catch_up_existing: bool,
    pub ignore: IgnoreRules,
    pub event_capacity: usize,
}

impl WatchConfig {
    /// A config with default timings, rename policy, no fallback and the
    /// default ignore rules.
    pub fn new(source: impl Into<PathBuf>, rules: CategoryRules) -> Self {
        Self {
            source: source.into(),
            rules,
            duplicate_policy: DuplicatePolicy::default(),
            fallback: None,
            rename_template: RenameTemplate::default(),
            max_rename_attempts: DEFAULT_MAX_RENAME_ATTEMPTS,
            quiescence: DEFAULT_QUIESCENCE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
            stop_grace: DEFAULT_STOP_GRACE,
            catch_up_existing: false,
            ignore: IgnoreRules::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    pub fn with_fallback(mut self, fallback: impl Into<PathBuf>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }

    pub fn with_timing(mut self, quiescence: Duration, poll_interval: Duration) -> Self {
        self.quiescence = quiescence;
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_catch_up(mut self, catch_up: bool) -> Self {
        self.catch_up_existing = catch_up;
        self
    }

    pub fn with_ignore(mut self, ignore: IgnoreRules) -> Self {
        self.ignore = ignore;
        self
    }

    /// Extension ambiguities in the rule table. First declared rule wins.
    pub fn warnings(&self) -> &[ExtensionConflict] {
        self.rules.conflicts()
    }

    pub(crate) fn resolver(&self) -> ConflictResolver {
        ConflictResolver::new(self.duplicate_policy)
            .with_template(self.rename_template.clone())
            .with_max_attempts(self.max_rename_attempts)
    }

    pub(crate) fn gate(&self) -> StabilityGate {
        StabilityGate::new(self.quiescence, self.max_wait)
    }

    /// Checks the settings that would make a session misbehave.
    ///
    /// `canonical_source` is the resolved form of `source`; a destination
    /// equal to either is rejected since moved files would be picked up
    /// again.
    pub fn validate(&self, canonical_source: &Path) -> Result<(), InvalidConfig> {
        if self.poll_interval.is_zero() {
            return Err(InvalidConfig::ZeroPollInterval);
        }
        if self.event_capacity == 0 {
            return Err(InvalidConfig::ZeroEventCapacity);
        }

        let is_source =
            |folder: &Path| folder == self.source.as_path() || folder == canonical_source;

        if let Some(rule) = self
            .rules
            .rules()
            .iter()
            .find(|rule| rule.enabled && is_source(rule.destination.as_path()))
        {
            return Err(InvalidConfig::DestinationIsSource {
                category: rule.name.clone(),
            });
        }

        if let Some(fallback) = &self.fallback
            && is_source(fallback.as_path())
        {
            return Err(InvalidConfig::DestinationIsSource {
                category: FALLBACK_CATEGORY.to_string(),
            });
        }

        Ok(())
    }
}
