//! Replay orchestrator: rebuild the entity store from a log.
//!
//! Delegates all classification and mutation to the kernel.
//! No shortcuts, no cached state.

use pathfinder_replay::engine::ReplayEngine;
use pathfinder_replay::error::RejectedRecord;
use pathfinder_replay::hashing::canonical_hash;
use pathfinder_replay::store::EntityStore;
use serde_json::Value;

use crate::error::RuntimeError;
use crate::log_reader::LogReader;

/// Rebuild the store from already-decoded lines.
///
/// 1. Create a fresh engine with the channel filter
/// 2. Pass each line sequentially to the kernel
/// 3. Return (final_store, canonical_hash)
///
/// A pure function of the lines and the filter.
pub fn rebuild_store(
    lines: &[Value],
    channel: Option<&str>,
) -> Result<(EntityStore, String), RejectedRecord> {
    let mut engine = ReplayEngine::new(channel.map(str::to_string));
    engine.apply_sequence(lines)?;
    let store = engine.into_store();
    let hash = canonical_hash(&store);
    Ok((store, hash))
}

/// Rebuild the store and return only the canonical hash.
pub fn rebuild_hash(lines: &[Value], channel: Option<&str>) -> Result<String, RejectedRecord> {
    let (_, hash) = rebuild_store(lines, channel)?;
    Ok(hash)
}

/// Stream a log file through a fresh engine.
pub fn rebuild_from_log(
    reader: &LogReader,
    channel: Option<&str>,
) -> Result<(EntityStore, String), RuntimeError> {
    let mut engine = ReplayEngine::new(channel.map(str::to_string));
    for line in reader.lines()? {
        let line = line?;
        engine
            .apply_line(&line.value)
            .map_err(|source| RuntimeError::Rejected {
                line_no: line.line_no,
                source,
            })?;
    }
    let store = engine.into_store();
    let hash = canonical_hash(&store);
    Ok((store, hash))
}
