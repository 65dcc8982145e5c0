/// Pathfinder replay: core domain types.
///
/// Pure data. The store owns these; transitions mutate them in place.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server-assigned entity id. Systems, connections and signatures each
/// have their own id space.
pub type EntityId = i64;

// ── Kinds and operations ───────────────────────────────────────────

/// The entity kinds the store materializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    System,
    Connection,
    Signature,
}

impl EntityKind {
    /// The word used for this kind in `message` and `formatted`.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::System => "system",
            EntityKind::Connection => "connection",
            EntityKind::Signature => "signature",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a single record did to its entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Creation,
    Update,
    Deletion,
}

impl Operation {
    /// Leading word of the formatted summary for this operation.
    pub fn verb(&self) -> &'static str {
        match self {
            Operation::Creation => "Created",
            Operation::Update => "Updated",
            Operation::Deletion => "Deleted",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Creation => "creation",
            Operation::Update => "update",
            Operation::Deletion => "deletion",
        })
    }
}

// ── Entities ───────────────────────────────────────────────────────

/// A solar system pinned on the map. Names are not unique across ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct System {
    pub id: EntityId,
    pub name: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    /// Only ever set to `Some(true)`; see `transitions::apply_system_fields`.
    pub locked: Option<bool>,
    pub status_id: Option<i64>,
    pub description: Option<String>,
    pub alias: Option<String>,
}

impl System {
    pub fn new(id: EntityId, name: &str, at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.to_string(),
            first_seen_at: at,
            last_seen_at: at,
            locked: None,
            status_id: None,
            description: None,
            alias: None,
        }
    }
}

/// A wormhole or stargate link between two systems.
///
/// `source` and `target` are optional because a connection recreated from
/// an update may not carry its endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: EntityId,
    pub source: Option<EntityId>,
    pub target: Option<EntityId>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub scope: Option<String>,
    pub kinds: Vec<String>,
    pub source_endpoint_types: Vec<String>,
    pub target_endpoint_types: Vec<String>,
}

impl Connection {
    pub fn new(id: EntityId, at: DateTime<Utc>) -> Self {
        Self {
            id,
            source: None,
            target: None,
            first_seen_at: at,
            last_seen_at: at,
            scope: None,
            kinds: Vec::new(),
            source_endpoint_types: Vec::new(),
            target_endpoint_types: Vec::new(),
        }
    }
}

/// A scanned cosmic signature inside a system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub id: EntityId,
    pub name: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub group_id: Option<i64>,
    pub type_id: Option<i64>,
    pub description: Option<String>,
    pub connection_id: Option<EntityId>,
}

impl Signature {
    pub fn new(id: EntityId, name: &str, at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.to_string(),
            first_seen_at: at,
            last_seen_at: at,
            group_id: None,
            type_id: None,
            description: None,
            connection_id: None,
        }
    }
}

// ── Outcomes ───────────────────────────────────────────────────────

/// One change made to the store.
///
/// `Recreated`, `Reactivated` and `MissingOnDelete` are the recoverable
/// data-gap cases: the log window started after the entity's creation, or
/// a deletion was repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mutation", rename_all = "snake_case")]
pub enum Mutation {
    Added { kind: EntityKind, id: EntityId },
    Updated { kind: EntityKind, id: EntityId },
    /// Update of an id the store never saw; the entity was created from
    /// the fields available in the update.
    Recreated { kind: EntityKind, id: EntityId },
    /// A system update switching `active` on for an absent id.
    Reactivated { kind: EntityKind, id: EntityId },
    Removed { kind: EntityKind, id: EntityId },
    /// Deletion of an id that is not in the store.
    MissingOnDelete { kind: EntityKind, id: EntityId },
}

impl Mutation {
    pub fn kind(&self) -> EntityKind {
        match *self {
            Mutation::Added { kind, .. }
            | Mutation::Updated { kind, .. }
            | Mutation::Recreated { kind, .. }
            | Mutation::Reactivated { kind, .. }
            | Mutation::Removed { kind, .. }
            | Mutation::MissingOnDelete { kind, .. } => kind,
        }
    }

    pub fn id(&self) -> EntityId {
        match *self {
            Mutation::Added { id, .. }
            | Mutation::Updated { id, .. }
            | Mutation::Recreated { id, .. }
            | Mutation::Reactivated { id, .. }
            | Mutation::Removed { id, .. }
            | Mutation::MissingOnDelete { id, .. } => id,
        }
    }

    /// True for the data-gap cases that were recovered instead of failing.
    pub fn is_recovery(&self) -> bool {
        matches!(
            self,
            Mutation::Recreated { .. } | Mutation::MissingOnDelete { .. }
        )
    }
}

/// Why a line never reached the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// `channelName` did not match the configured filter.
    ChannelFiltered,
    /// `message` type was `map`.
    MapMessage,
    /// Route was `/api/rest/Map/...` (map creation noise).
    MapRoute,
}

/// A record that was classified and applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedRecord {
    pub operation: Operation,
    pub kind: EntityKind,
    pub id: EntityId,
    pub actor: String,
    pub at: DateTime<Utc>,
    pub mutations: Vec<Mutation>,
}

/// Result of feeding one line to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordOutcome {
    Skipped(SkipReason),
    Applied(AppliedRecord),
}
