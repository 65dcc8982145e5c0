//! Replay session: one engine plus running statistics.
//!
//! The session feeds lines to the kernel in file order and tallies what
//! happened to each: skipped (and why), applied (and as what), and how
//! many data gaps were recovered along the way. A fatal record stops the
//! session; the store stays inspectable in the state before that line.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use pathfinder_replay::domain::{EntityKind, Operation, RecordOutcome, SkipReason};
use pathfinder_replay::engine::ReplayEngine;
use pathfinder_replay::hashing::canonical_hash;
use pathfinder_replay::store::EntityStore;
use serde::Serialize;
use tracing::info;

use crate::error::RuntimeError;
use crate::log_reader::{LogLine, LogReader};

/// Running counters for a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayStats {
    pub lines: u64,
    pub skipped: BTreeMap<SkipReason, u64>,
    pub created: u64,
    pub updated: u64,
    pub deleted: u64,
    /// Recovery mutations: recreated on update, missing on delete.
    pub recovered: u64,
    pub first_at: Option<DateTime<Utc>>,
    pub last_at: Option<DateTime<Utc>>,
}

impl ReplayStats {
    fn record(&mut self, outcome: &RecordOutcome) {
        self.lines += 1;
        match outcome {
            RecordOutcome::Skipped(reason) => {
                *self.skipped.entry(*reason).or_insert(0) += 1;
            }
            RecordOutcome::Applied(applied) => {
                match applied.operation {
                    Operation::Creation => self.created += 1,
                    Operation::Update => self.updated += 1,
                    Operation::Deletion => self.deleted += 1,
                }
                self.recovered += applied.mutations.iter().filter(|m| m.is_recovery()).count() as u64;
                self.first_at = Some(self.first_at.map_or(applied.at, |t| t.min(applied.at)));
                self.last_at = Some(self.last_at.map_or(applied.at, |t| t.max(applied.at)));
            }
        }
    }

    pub fn skipped_total(&self) -> u64 {
        self.skipped.values().sum()
    }

    pub fn applied_total(&self) -> u64 {
        self.created + self.updated + self.deleted
    }
}

/// End-of-replay report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub channel: Option<String>,
    pub stats: ReplayStats,
    pub systems: usize,
    pub connections: usize,
    pub signatures: usize,
    pub hash: String,
}

/// A replay in progress.
pub struct ReplaySession {
    engine: ReplayEngine,
    stats: ReplayStats,
}

impl ReplaySession {
    pub fn new(channel: Option<String>) -> Self {
        Self {
            engine: ReplayEngine::new(channel),
            stats: ReplayStats::default(),
        }
    }

    /// Feed one line. Fatal records are returned with their line number.
    pub fn feed(&mut self, line: &LogLine) -> Result<RecordOutcome, RuntimeError> {
        let outcome = self
            .engine
            .apply_line(&line.value)
            .map_err(|source| RuntimeError::Rejected {
                line_no: line.line_no,
                source,
            })?;
        self.stats.record(&outcome);
        Ok(outcome)
    }

    /// Feed every line of a log, stopping at the first fatal error.
    pub fn run(&mut self, reader: &LogReader) -> Result<ReplaySummary, RuntimeError> {
        info!(path = %reader.path().display(), channel = ?self.engine.channel_filter(), "replay started");
        for line in reader.lines()? {
            self.feed(&line?)?;
        }
        let summary = self.summary();
        info!(
            lines = summary.stats.lines,
            applied = summary.stats.applied_total(),
            skipped = summary.stats.skipped_total(),
            recovered = summary.stats.recovered,
            "replay finished"
        );
        Ok(summary)
    }

    pub fn stats(&self) -> &ReplayStats {
        &self.stats
    }

    pub fn store(&self) -> &EntityStore {
        self.engine.store()
    }

    pub fn summary(&self) -> ReplaySummary {
        let store = self.engine.store();
        ReplaySummary {
            channel: self.engine.channel_filter().map(str::to_string),
            stats: self.stats.clone(),
            systems: store.len(EntityKind::System),
            connections: store.len(EntityKind::Connection),
            signatures: store.len(EntityKind::Signature),
            hash: canonical_hash(store),
        }
    }
}
