//! Start/stop control surface of the organizer.
//!
//! A [`WatcherEngine`] runs at most one session at a time. Starting a session
//! subscribes to the source folder through `notify` and spawns a dispatcher
//! task that owns every pending file; stopping it unsubscribes, discards
//! pending files and waits a bounded time for moves already underway.
//!
//! ```no_run
//! use autotidy::category_rules::CategoryRules;
//! use autotidy::engine::WatcherEngine;
//! use autotidy::watch_config::WatchConfig;
//! use std::path::Path;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let source = Path::new("/home/user/Downloads");
//! let engine = WatcherEngine::new();
//! let mut outcomes = engine.subscribe();
//!
//! engine
//!     .start(WatchConfig::new(source, CategoryRules::standard(Path::new("/home/user"))))
//!     .await?;
//! while let Ok(outcome) = outcomes.recv().await {
//!     println!("{:?}", outcome);
//! }
//! engine.stop().await?;
//! # Ok(())
//! # }
//! ```

use crate::dispatcher::{Dispatcher, WatchMessage};
use crate::outcome::MoveOutcome;
use crate::watch_config::{InvalidConfig, WatchConfig};
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{error, info, warn};

/// Buffered outcomes per subscriber before slow receivers start lagging.
const OUTCOME_CAPACITY: usize = 256;

/// Lifecycle state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    Stopped,
    Starting,
    Running,
    Stopping,
    /// The filesystem subscription was lost. Only `stop` or a fresh `start`
    /// are accepted.
    Faulted,
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EngineStatus::Stopped => "stopped",
            EngineStatus::Starting => "starting",
            EngineStatus::Running => "running",
            EngineStatus::Stopping => "stopping",
            EngineStatus::Faulted => "faulted",
        })
    }
}

/// Why a session could not be started. The engine stays stopped.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("source folder {} does not exist", .0.display())]
    SourceMissing(PathBuf),
    #[error("source folder {} is not readable: {reason}", .path.display())]
    SourceUnreadable { path: PathBuf, reason: String },
    #[error("could not watch {}: {reason}", .path.display())]
    SubscriptionFailed { path: PathBuf, reason: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] InvalidConfig),
    #[error("engine is already {0}")]
    AlreadyRunning(EngineStatus),
}

/// Problems while stopping. The engine is stopped regardless.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StopError {
    #[error("{} move(s) were still running when the stop grace period ran out", .abandoned.len())]
    GraceExceeded { abandoned: Vec<PathBuf> },
}

struct Session {
    /// Cancels the dispatcher when dropped.
    shutdown: DropGuard,
    watcher: RecommendedWatcher,
    dispatcher: JoinHandle<Vec<PathBuf>>,
}

impl Session {
    /// Cancels the dispatcher, waits for it to drain, then drops the
    /// subscription.
    ///
    /// The dispatcher closes its event receiver as soon as it is cancelled,
    /// so the notify thread can never stay blocked on a full channel while
    /// the watcher is being dropped.
    async fn close(self) -> Vec<PathBuf> {
        let Session {
            shutdown,
            watcher,
            dispatcher,
        } = self;
        drop(shutdown);

        let abandoned = match dispatcher.await {
            Ok(abandoned) => abandoned,
            Err(e) => {
                error!(error = %e, "dispatcher task ended abnormally");
                Vec::new()
            }
        };
        drop(watcher);
        abandoned
    }
}

/// Watches one folder and organizes files as they arrive.
pub struct WatcherEngine {
    status: Arc<watch::Sender<EngineStatus>>,
    outcomes: broadcast::Sender<MoveOutcome>,
    session: Mutex<Option<Session>>,
}

impl Default for WatcherEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl WatcherEngine {
    pub fn new() -> Self {
        let (status, _) = watch::channel(EngineStatus::Stopped);
        let (outcomes, _) = broadcast::channel(OUTCOME_CAPACITY);
        Self {
            status: Arc::new(status),
            outcomes,
            session: Mutex::new(None),
        }
    }

    /// Starts a session with `config`.
    ///
    /// Starting a faulted engine first tears down the failed session.
    ///
    /// # Errors
    ///
    /// Fails if the engine is already active, the source folder is missing or
    /// unreadable, the configuration is rejected, or the filesystem
    /// subscription cannot be established. The engine is left stopped.
    pub async fn start(&self, config: WatchConfig) -> Result<(), StartError> {
        let mut session = self.session.lock().await;

        let current = self.status();
        match current {
            EngineStatus::Stopped => {}
            EngineStatus::Faulted => {
                if let Some(old) = session.take() {
                    old.close().await;
                }
            }
            other => return Err(StartError::AlreadyRunning(other)),
        }

        self.set_status(EngineStatus::Starting);
        match self.open_session(config) {
            Ok(opened) => {
                *session = Some(opened);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "failed to start");
                self.set_status(EngineStatus::Stopped);
                Err(e)
            }
        }
    }

    fn open_session(&self, config: WatchConfig) -> Result<Session, StartError> {
        let source = check_source(&config.source)?;
        config.validate(&source)?;
        for warning in config.warnings() {
            warn!("{}", warning);
        }

        let (tx, rx) = mpsc::channel(config.event_capacity);
        let watcher = subscribe(&source, tx)?;

        let mut dispatcher = Dispatcher::new(
            source.clone(),
            &config,
            self.outcomes.clone(),
            Arc::clone(&self.status),
        );
        if config.catch_up_existing {
            dispatcher.catch_up();
        }

        let token = CancellationToken::new();
        self.set_status(EngineStatus::Running);
        let handle = tokio::spawn(dispatcher.run(rx, token.clone(), config.stop_grace));

        info!(
            source = %source.display(),
            policy = %config.duplicate_policy,
            categories = config.rules.rules().len(),
            "watching"
        );

        Ok(Session {
            shutdown: token.drop_guard(),
            watcher,
            dispatcher: handle,
        })
    }

    /// Stops the current session, if any.
    ///
    /// Pending files are discarded without outcomes. Moves already underway
    /// get the configured grace period; any still running after it are
    /// reported as interrupted.
    ///
    /// # Errors
    ///
    /// Returns [`StopError::GraceExceeded`] if moves were abandoned. The
    /// engine is stopped either way.
    pub async fn stop(&self) -> Result<(), StopError> {
        let mut session = self.session.lock().await;
        let Some(active) = session.take() else {
            self.set_status(EngineStatus::Stopped);
            return Ok(());
        };

        self.set_status(EngineStatus::Stopping);
        let abandoned = active.close().await;
        self.set_status(EngineStatus::Stopped);
        info!("stopped");

        if abandoned.is_empty() {
            Ok(())
        } else {
            Err(StopError::GraceExceeded { abandoned })
        }
    }

    pub fn status(&self) -> EngineStatus {
        *self.status.borrow()
    }

    /// Follows status transitions, including faults raised by the session.
    pub fn watch_status(&self) -> watch::Receiver<EngineStatus> {
        self.status.subscribe()
    }

    /// Receives every outcome produced after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<MoveOutcome> {
        self.outcomes.subscribe()
    }

    fn set_status(&self, status: EngineStatus) {
        self.status.send_replace(status);
    }
}

/// Confirms the source folder exists and can be listed, returning its
/// canonical path.
fn check_source(source: &Path) -> Result<PathBuf, StartError> {
    let metadata = match fs::metadata(source) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(StartError::SourceMissing(source.to_path_buf()));
        }
        Err(e) => {
            return Err(StartError::SourceUnreadable {
                path: source.to_path_buf(),
                reason: e.to_string(),
            });
        }
    };
    if !metadata.is_dir() {
        return Err(StartError::SourceUnreadable {
            path: source.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }

    let unreadable = |e: io::Error| StartError::SourceUnreadable {
        path: source.to_path_buf(),
        reason: e.to_string(),
    };
    fs::read_dir(source).map_err(unreadable)?;
    fs::canonicalize(source).map_err(unreadable)
}

/// Subscribes to the source folder, forwarding notifications into `tx`.
fn subscribe(
    source: &Path,
    tx: mpsc::Sender<WatchMessage>,
) -> Result<RecommendedWatcher, StartError> {
    let failed = |e: notify::Error| StartError::SubscriptionFailed {
        path: source.to_path_buf(),
        reason: e.to_string(),
    };

    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| {
            let message = match res {
                Ok(event) => WatchMessage::Event(event),
                Err(e) => WatchMessage::Error(e.to_string()),
            };
            // Fails only once the dispatcher has gone away.
            let _ = tx.blocking_send(message);
        },
        NotifyConfig::default(),
    )
    .map_err(failed)?;

    watcher
        .watch(source, RecursiveMode::NonRecursive)
        .map_err(failed)?;
    Ok(watcher)
}
