//! Error types for the replay kernel.
//!
//! Every [`ReplayError`] is fatal: it means the log format or the route
//! whitelist has drifted away from what the kernel understands. Data gaps
//! (updates or deletions of ids the store never saw) are not errors; they
//! are reported through [`crate::domain::Mutation`].

use crate::domain::{EntityKind, Operation};

/// Fatal, structural problems with a single log record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
    /// A required field is missing or has the wrong JSON type.
    #[error("malformed record: {reason}")]
    MalformedRecord {
        /// What was wrong.
        reason: String,
    },

    /// `extra.path` matches none of the known API routes.
    #[error("unrecognized extra.path {path:?}")]
    UnrecognizedPath {
        /// The route as it appeared in the log.
        path: String,
    },

    /// The first word of `message` is not a known entity type.
    #[error("unknown message type {message_type:?}")]
    UnknownMessageType {
        /// The offending word.
        message_type: String,
    },

    /// The diff-based classification disagrees with the formatted summary.
    #[error("record classified as {kind} {operation} but formatted text reads {formatted:?}")]
    ClassificationMismatch {
        /// Classified operation.
        operation: Operation,
        /// Entity kind from the message.
        kind: EntityKind,
        /// The summary text that failed the cross-check.
        formatted: String,
    },

    /// The record's fields or route do not fit the shape expected for its
    /// classified operation.
    #[error("invalid {kind} {operation} event: {reason}")]
    InvalidEventShape {
        /// Classified operation.
        operation: Operation,
        /// Entity kind.
        kind: EntityKind,
        /// Which check failed.
        reason: String,
    },

    /// A creation event for an id that is already in the store.
    #[error("{kind} {id} already exists in the store")]
    DuplicateEntity {
        /// Entity kind.
        kind: EntityKind,
        /// The duplicated id.
        id: i64,
    },
}

impl ReplayError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            reason: reason.into(),
        }
    }

    pub(crate) fn shape(operation: Operation, kind: EntityKind, reason: impl Into<String>) -> Self {
        Self::InvalidEventShape {
            operation,
            kind,
            reason: reason.into(),
        }
    }
}

/// A fatal error together with the record that caused it.
///
/// `record` is the log line re-rendered as compact JSON so the caller can
/// print it verbatim for diagnosis.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("record #{sequence} rejected: {source}\n  record: {record}")]
pub struct RejectedRecord {
    /// 1-based position of the record among the lines fed to the engine.
    pub sequence: u64,
    /// The offending line.
    pub record: String,
    /// Why it was rejected.
    #[source]
    pub source: ReplayError,
}
