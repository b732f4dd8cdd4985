//! Host configuration file.
//!
//! The engine only ever sees a [`WatchConfig`]. This module is the host's
//! side: it finds and parses a TOML file, fills in defaults, expands `~`, and
//! validates the result into a `WatchConfig`.
//!
//! # Configuration File Format
//!
//! ```toml
//! source = "~/Downloads"
//! duplicates = "rename"      # rename | skip | overwrite
//! fallback = "none"          # a folder for unmatched files, or "none"
//! catch_up = false
//!
//! [timing]
//! quiescence_ms = 1500
//! poll_interval_ms = 500
//! max_wait_secs = 30
//! stop_grace_secs = 10
//!
//! [rename]
//! template = "{stem}({n}){ext}"
//! max_attempts = 10000
//!
//! [filters]
//! enable_hidden_files = false
//!
//! [filters.exclude]
//! extensions = ["tmp", "part", "crdownload"]
//!
//! [[categories]]
//! name = "Images"
//! folder = "~/Pictures"
//! extensions = ["jpg", "png"]
//! enabled = true
//! ```

use crate::category_rules::{CategoryRule, CategoryRules, STANDARD_CATEGORIES};
use crate::conflict::{
    ConflictError, DEFAULT_MAX_RENAME_ATTEMPTS, DEFAULT_RENAME_TEMPLATE, DuplicatePolicy,
    RenameTemplate,
};
use crate::filters::{FilterError, FilterRules, IgnoreRules};
use crate::watch_config::{InvalidConfig, WatchConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Name of the per-directory configuration file.
pub const LOCAL_CONFIG_FILE: &str = ".autotidy.toml";

/// Literal used for `fallback` to leave unmatched files alone.
pub const NO_FALLBACK: &str = "none";

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
    #[error("I/O error on configuration file: {0}")]
    IoError(String),
    #[error("category names must not be empty")]
    EmptyCategoryName,
    #[error("category '{0}' is defined more than once")]
    DuplicateCategory(String),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error(transparent)]
    Template(#[from] ConflictError),
    #[error(transparent)]
    Rejected(#[from] InvalidConfig),
}

/// Stability and shutdown timings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub quiescence_ms: u64,
    pub poll_interval_ms: u64,
    pub max_wait_secs: u64,
    pub stop_grace_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            quiescence_ms: 1500,
            poll_interval_ms: 500,
            max_wait_secs: 30,
            stop_grace_secs: 10,
        }
    }
}

/// Settings for the rename duplicate policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenameConfig {
    pub template: String,
    pub max_attempts: u32,
}

impl Default for RenameConfig {
    fn default() -> Self {
        Self {
            template: DEFAULT_RENAME_TEMPLATE.to_string(),
            max_attempts: DEFAULT_MAX_RENAME_ATTEMPTS,
        }
    }
}

/// One `[[categories]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub name: String,
    pub folder: String,
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// The whole configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub duplicates: DuplicatePolicy,
    #[serde(default = "default_fallback")]
    pub fallback: String,
    #[serde(default)]
    pub catch_up: bool,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub rename: RenameConfig,
    #[serde(default)]
    pub filters: FilterRules,
    #[serde(default = "default_categories")]
    pub categories: Vec<CategoryConfig>,
}

fn default_source() -> String {
    "~/Downloads".to_string()
}

fn default_fallback() -> String {
    NO_FALLBACK.to_string()
}

fn default_categories() -> Vec<CategoryConfig> {
    STANDARD_CATEGORIES
        .iter()
        .map(|(name, folder, extensions)| CategoryConfig {
            name: name.to_string(),
            folder: format!("~/{}", folder),
            extensions: extensions.iter().map(|ext| ext.to_string()).collect(),
            enabled: true,
        })
        .collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            duplicates: DuplicatePolicy::default(),
            fallback: default_fallback(),
            catch_up: false,
            timing: TimingConfig::default(),
            rename: RenameConfig::default(),
            filters: FilterRules::default(),
            categories: default_categories(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a file, with fallback to defaults.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. Look for `.autotidy.toml` in the current directory
    /// 3. Look for `~/.config/autotidy/config.toml` in home directory
    /// 4. Fall back to default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is explicitly provided but
    /// cannot be read, or if any file found cannot be parsed.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(home_config) = user_config_path()
            && home_config.exists()
        {
            return Self::load_from_file(&home_config);
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigNotFound` if file does not exist.
    /// Returns `ConfigError::ConfigInvalid` if TOML parsing fails.
    /// Returns `ConfigError::IoError` if file cannot be read.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
    }

    /// Writes this configuration as TOML, creating parent folders.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }
        fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))
    }

    /// Validates the file and builds the engine's session configuration.
    ///
    /// # Errors
    ///
    /// Fails on empty or repeated category names, a malformed rename
    /// template, uncompilable filters, or a destination equal to the source
    /// folder. Extensions listed by several categories are not an error;
    /// they show up in [`WatchConfig::warnings`].
    pub fn into_watch_config(self) -> Result<WatchConfig, ConfigError> {
        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(self.categories.len());
        for category in &self.categories {
            let name = category.name.trim();
            if name.is_empty() {
                return Err(ConfigError::EmptyCategoryName);
            }
            if !seen.insert(name.to_lowercase()) {
                return Err(ConfigError::DuplicateCategory(name.to_string()));
            }
            rules.push(
                CategoryRule::new(name, expand_home(&category.folder), &category.extensions)
                    .with_enabled(category.enabled),
            );
        }

        let template = RenameTemplate::parse(&self.rename.template)?;
        let ignore = IgnoreRules::compile(&self.filters)?;
        let source = expand_home(&self.source);

        let mut config = WatchConfig::new(source, CategoryRules::new(rules))
            .with_duplicate_policy(self.duplicates)
            .with_catch_up(self.catch_up)
            .with_ignore(ignore)
            .with_timing(
                Duration::from_millis(self.timing.quiescence_ms),
                Duration::from_millis(self.timing.poll_interval_ms),
            );
        config.rename_template = template;
        config.max_rename_attempts = self.rename.max_attempts;
        config.max_wait = Duration::from_secs(self.timing.max_wait_secs);
        config.stop_grace = Duration::from_secs(self.timing.stop_grace_secs);

        let fallback = self.fallback.trim();
        if !fallback.is_empty() && !fallback.eq_ignore_ascii_case(NO_FALLBACK) {
            config.fallback = Some(expand_home(fallback));
        }

        let canonical = fs::canonicalize(&config.source).unwrap_or_else(|_| config.source.clone());
        config.validate(&canonical)?;
        Ok(config)
    }
}

/// `$HOME/.config/autotidy/config.toml`, if `HOME` is set.
pub fn user_config_path() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".config").join("autotidy").join("config.toml"))
}

/// Expands a leading `~` to the home directory.
///
/// ```
/// use autotidy::config::expand_home;
/// use std::path::PathBuf;
///
/// assert_eq!(expand_home("/srv/inbox"), PathBuf::from("/srv/inbox"));
/// ```
pub fn expand_home(path: &str) -> PathBuf {
    let Some(home) = home_dir() else {
        return PathBuf::from(path);
    };
    if path == "~" {
        return home;
    }
    match path
        .strip_prefix("~/")
        .or_else(|| path.strip_prefix("~\\"))
    {
        Some(rest) => home.join(rest),
        None => PathBuf::from(path),
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}
