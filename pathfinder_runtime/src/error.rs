//! Runtime errors.
//!
//! Everything here is fatal for a replay: the runtime never retries,
//! the input is a static log that is already on disk.

use std::io;
use std::path::PathBuf;

use pathfinder_replay::error::RejectedRecord;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("cannot read log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("line {line_no}: invalid JSON: {source}")]
    Json {
        line_no: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("line {line_no}: {source}")]
    Rejected {
        line_no: usize,
        #[source]
        source: RejectedRecord,
    },

    #[error("replay is not deterministic: {first} != {second}")]
    Nondeterministic { first: String, second: String },
}
