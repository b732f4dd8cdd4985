//! The single task that owns a session's pending files.
//!
//! Filesystem notifications arrive on a bounded channel, a ticker drives
//! stability checks, and stable files are handed to blocking workers. All
//! mutation of the pending set happens here, one message at a time.

use crate::engine::EngineStatus;
use crate::mover::FailureReason;
use crate::outcome::{MoveOutcome, OutcomeKind};
use crate::pipeline::Pipeline;
use crate::stability::{Observation, StabilityGate, Verdict};
use crate::filters::IgnoreRules;
use notify::Event;
use notify::event::{EventKind, ModifyKind, RenameMode};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{MissedTickBehavior, interval, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Messages forwarded from the notify callback thread.
#[derive(Debug)]
pub(crate) enum WatchMessage {
    Event(Event),
    Error(String),
}

/// A file seen in the source folder that has not been moved yet.
#[derive(Debug, Clone)]
struct PendingEntry {
    first_observed: Instant,
    /// Last sample taken by the stability gate, if any.
    observation: Option<Observation>,
}

type MoveResult = (PathBuf, Option<MoveOutcome>);

pub(crate) struct Dispatcher {
    source: PathBuf,
    gate: StabilityGate,
    ignore: IgnoreRules,
    poll_interval: Duration,
    pipeline: Arc<Pipeline>,
    pending: HashMap<PathBuf, PendingEntry>,
    in_flight: HashSet<PathBuf>,
    /// In-flight paths where a new file appeared before the move finished.
    reappeared: HashSet<PathBuf>,
    /// Files a finished attempt left in the source folder. Rescans skip them.
    left_in_place: HashSet<PathBuf>,
    moves: JoinSet<MoveResult>,
    outcomes: broadcast::Sender<MoveOutcome>,
    status: Arc<watch::Sender<EngineStatus>>,
    faulted: bool,
}

impl Dispatcher {
    pub(crate) fn new(
        source: PathBuf,
        config: &crate::watch_config::WatchConfig,
        outcomes: broadcast::Sender<MoveOutcome>,
        status: Arc<watch::Sender<EngineStatus>>,
    ) -> Self {
        Self {
            source,
            gate: config.gate(),
            ignore: config.ignore.clone(),
            poll_interval: config.poll_interval,
            pipeline: Arc::new(Pipeline::new(config)),
            pending: HashMap::new(),
            in_flight: HashSet::new(),
            reappeared: HashSet::new(),
            left_in_place: HashSet::new(),
            moves: JoinSet::new(),
            outcomes,
            status,
            faulted: false,
        }
    }

    /// Registers every regular file already in the source folder.
    pub(crate) fn catch_up(&mut self) {
        self.rescan("catching up on existing files");
    }

    /// Lists the source folder and tracks files no event told us about.
    fn rescan(&mut self, reason: &str) {
        let entries = match fs::read_dir(&self.source) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(source = %self.source.display(), error = %e, "could not list source folder");
                return;
            }
        };

        let before = self.pending.len();
        for entry in entries.flatten() {
            let path = entry.path();
            if !self.left_in_place.contains(&path) {
                self.track(&path);
            }
        }
        info!(
            source = %self.source.display(),
            files = self.pending.len() - before,
            "{reason}"
        );
    }

    /// Runs until `shutdown` is cancelled, then drains in-flight moves for at
    /// most `grace`. Returns the paths whose moves were abandoned.
    pub(crate) async fn run(
        mut self,
        mut events: mpsc::Receiver<WatchMessage>,
        shutdown: CancellationToken,
        grace: Duration,
    ) -> Vec<PathBuf> {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                Some(joined) = self.moves.join_next(), if !self.moves.is_empty() => {
                    self.finish(joined);
                }

                message = events.recv(), if !self.faulted => match message {
                    Some(WatchMessage::Event(event)) => self.handle_event(event),
                    Some(WatchMessage::Error(error)) => self.fault(&error),
                    None => self.fault("event subscription closed"),
                },

                _ = ticker.tick(), if !self.faulted => self.poll(),
            }
        }

        drop(events);
        self.drain(grace).await
    }

    fn handle_event(&mut self, event: Event) {
        trace!(kind = ?event.kind, paths = ?event.paths, "filesystem event");
        if event.need_rescan() {
            warn!(source = %self.source.display(), "events were dropped, rescanning");
            self.rescan("rescanned source folder");
            return;
        }
        let mut paths = event.paths.into_iter();

        match event.kind {
            EventKind::Create(_) => paths.for_each(|path| self.track(&path)),
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if let Some(from) = paths.next() {
                    self.forget(&from);
                }
                if let Some(to) = paths.next() {
                    self.track(&to);
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                paths.for_each(|path| self.forget(&path));
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                paths.for_each(|path| self.track(&path));
            }
            // Backends that cannot tell the two rename halves apart.
            EventKind::Modify(ModifyKind::Name(_)) => {
                for path in paths {
                    if path.exists() {
                        self.track(&path);
                    } else {
                        self.forget(&path);
                    }
                }
            }
            EventKind::Remove(_) => {
                for path in paths {
                    if path == self.source {
                        self.fault("source folder was removed");
                        return;
                    }
                    self.forget(&path);
                }
            }
            _ => {}
        }
    }

    /// Starts tracking `path` if it is a new, non-ignored file directly in
    /// the source folder.
    fn track(&mut self, path: &Path) {
        if path.parent() != Some(self.source.as_path()) {
            trace!(path = %path.display(), "outside the source folder");
            return;
        }
        if self.pending.contains_key(path) {
            return;
        }
        if self.in_flight.contains(path) {
            trace!(path = %path.display(), "seen again while its move runs");
            self.reappeared.insert(path.to_path_buf());
            return;
        }
        if self.ignore.is_ignored(path) {
            debug!(path = %path.display(), "ignored");
            return;
        }
        match fs::metadata(path) {
            Ok(metadata) if metadata.is_file() => {}
            _ => return,
        }

        debug!(path = %path.display(), "tracking new file");
        self.pending.insert(
            path.to_path_buf(),
            PendingEntry {
                first_observed: Instant::now(),
                observation: None,
            },
        );
    }

    fn forget(&mut self, path: &Path) {
        self.left_in_place.remove(path);
        if self.pending.remove(path).is_some() {
            debug!(path = %path.display(), "pending file went away");
        }
    }

    /// One round of stability checks over every pending file.
    fn poll(&mut self) {
        if !self.source.is_dir() {
            self.fault("source folder is no longer a directory");
            return;
        }

        let now = Instant::now();
        let mut ready = Vec::new();
        let mut expired = Vec::new();
        let mut dropped = Vec::new();

        for (path, entry) in self.pending.iter_mut() {
            match self.gate.check_at(path, entry.observation.as_ref(), now) {
                Verdict::Stable(_) => ready.push(path.clone()),
                Verdict::Vanished | Verdict::NotAFile => dropped.push(path.clone()),
                Verdict::Settling(observation) => {
                    entry.observation = Some(observation);
                    if self.gate.deadline_passed(entry.first_observed, now) {
                        expired.push(path.clone());
                    }
                }
                Verdict::Busy => {
                    if self.gate.deadline_passed(entry.first_observed, now) {
                        expired.push(path.clone());
                    }
                }
            }
        }

        for path in dropped {
            self.forget(&path);
        }

        for path in expired {
            self.pending.remove(&path);
            self.left_in_place.insert(path.clone());
            self.emit(MoveOutcome::failed(
                &path,
                None,
                FailureReason::NeverStabilized,
            ));
        }

        for path in ready {
            self.pending.remove(&path);
            self.spawn_move(path);
        }
    }

    fn spawn_move(&mut self, path: PathBuf) {
        debug!(path = %path.display(), "file is stable, organizing");
        self.in_flight.insert(path.clone());
        let pipeline = Arc::clone(&self.pipeline);

        self.moves.spawn_blocking(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| pipeline.process(&path)))
                .unwrap_or_else(|_| {
                    Some(MoveOutcome::failed(
                        &path,
                        None,
                        FailureReason::Other("move worker panicked".to_string()),
                    ))
                });
            (path, outcome)
        });
    }

    fn finish(&mut self, joined: Result<MoveResult, JoinError>) {
        match joined {
            Ok((path, outcome)) => {
                self.in_flight.remove(&path);
                match outcome {
                    Some(outcome) => {
                        if !outcome.is_moved() {
                            self.left_in_place.insert(path.clone());
                        }
                        self.emit(outcome);
                    }
                    None => debug!(path = %path.display(), "file vanished before it was moved"),
                }
                if self.reappeared.remove(&path) && !self.faulted {
                    self.left_in_place.remove(&path);
                    self.track(&path);
                }
            }
            Err(e) => error!(error = %e, "move task failed to join"),
        }
    }

    fn fault(&mut self, reason: &str) {
        if self.faulted {
            return;
        }
        error!(
            source = %self.source.display(),
            reason,
            pending = self.pending.len(),
            "lost the filesystem subscription"
        );
        self.faulted = true;
        self.pending.clear();
        self.reappeared.clear();
        self.status.send_replace(EngineStatus::Faulted);
    }

    async fn drain(mut self, grace: Duration) -> Vec<PathBuf> {
        if !self.pending.is_empty() {
            debug!(count = self.pending.len(), "discarding pending files");
            self.pending.clear();
        }
        self.reappeared.clear();

        let deadline = tokio::time::Instant::now() + grace;
        while !self.moves.is_empty() {
            match timeout_at(deadline, self.moves.join_next()).await {
                Ok(Some(joined)) => self.finish(joined),
                Ok(None) => break,
                Err(_) => break,
            }
        }

        let abandoned: Vec<PathBuf> = self.in_flight.drain().collect();
        for path in &abandoned {
            self.emit(MoveOutcome::failed(path, None, FailureReason::Interrupted));
        }
        self.moves.detach_all();
        abandoned
    }

    fn emit(&self, outcome: MoveOutcome) {
        match &outcome.result {
            OutcomeKind::Moved => info!(
                source = %outcome.source.display(),
                destination = ?outcome.destination,
                category = ?outcome.category,
                "moved"
            ),
            OutcomeKind::SkippedDuplicate => info!(
                source = %outcome.source.display(),
                "skipped, destination already exists"
            ),
            OutcomeKind::SkippedUnmatched => debug!(
                source = %outcome.source.display(),
                "skipped, no matching category"
            ),
            OutcomeKind::Failed(reason) => warn!(
                source = %outcome.source.display(),
                %reason,
                "failed to organize file"
            ),
        }
        // No subscribers is fine.
        let _ = self.outcomes.send(outcome);
    }
}
