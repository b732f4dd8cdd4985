//! autotidy - watches a folder and files new arrivals by type
//!
//! This library provides the organizer engine: extension-based category
//! rules, a stability gate that waits for downloads to finish, duplicate-name
//! resolution, moves with typed failures, and the watcher that ties them
//! together. The `autotidy` binary adds TOML configuration and a CLI on top.

pub mod category_rules;
pub mod cli;
pub mod config;
pub mod conflict;
mod dispatcher;
pub mod engine;
pub mod filters;
pub mod logging;
pub mod mover;
pub mod outcome;
pub mod output;
mod pipeline;
pub mod stability;
pub mod watch_config;

pub use category_rules::{CategoryRule, CategoryRules, Classification};
pub use config::{AppConfig, ConfigError};
pub use conflict::{ConflictResolver, DuplicatePolicy, RenameTemplate, Resolution};
pub use engine::{EngineStatus, StartError, StopError, WatcherEngine};
pub use filters::{FilterRules, IgnoreRules};
pub use mover::{FailureReason, Mover};
pub use outcome::{MoveOutcome, OutcomeKind};
pub use stability::{StabilityGate, Verdict};
pub use watch_config::WatchConfig;

pub use cli::{Cli, run_cli};
