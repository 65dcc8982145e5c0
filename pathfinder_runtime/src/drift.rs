//! Drift detection: determinism verification and store comparison.

use std::collections::{BTreeMap, BTreeSet};

use pathfinder_replay::domain::{EntityId, EntityKind};
use pathfinder_replay::store::EntityStore;
use serde::Serialize;
use serde_json::Value;

use crate::error::RuntimeError;
use crate::replay;

/// Replay the same lines twice and require identical hashes.
/// Returns the hash on success.
pub fn verify_determinism(lines: &[Value], channel: Option<&str>) -> Result<String, RuntimeError> {
    let first = replay::rebuild_hash(lines, channel).map_err(|source| RuntimeError::Rejected {
        line_no: source.sequence as usize,
        source,
    })?;
    let second = replay::rebuild_hash(lines, channel).map_err(|source| RuntimeError::Rejected {
        line_no: source.sequence as usize,
        source,
    })?;

    if first != second {
        return Err(RuntimeError::Nondeterministic { first, second });
    }
    Ok(first)
}

/// Differences for one entity kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KindDrift {
    pub count_a: usize,
    pub count_b: usize,
    pub added: Vec<EntityId>,
    pub removed: Vec<EntityId>,
    /// Present in both, with different contents.
    pub changed: Vec<EntityId>,
}

impl KindDrift {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Structured comparison of two stores, per entity kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    pub kinds: BTreeMap<EntityKind, KindDrift>,
}

impl DriftReport {
    pub fn is_empty(&self) -> bool {
        self.kinds.values().all(KindDrift::is_empty)
    }

    pub fn kind(&self, kind: EntityKind) -> Option<&KindDrift> {
        self.kinds.get(&kind)
    }
}

/// Compare store `a` (before) with store `b` (after).
pub fn compare_stores(a: &EntityStore, b: &EntityStore) -> DriftReport {
    let mut kinds = BTreeMap::new();
    kinds.insert(EntityKind::System, diff_maps(&a.systems, &b.systems));
    kinds.insert(EntityKind::Connection, diff_maps(&a.connections, &b.connections));
    kinds.insert(EntityKind::Signature, diff_maps(&a.signatures, &b.signatures));
    DriftReport { kinds }
}

fn diff_maps<T: PartialEq>(a: &BTreeMap<EntityId, T>, b: &BTreeMap<EntityId, T>) -> KindDrift {
    let ids_a: BTreeSet<EntityId> = a.keys().copied().collect();
    let ids_b: BTreeSet<EntityId> = b.keys().copied().collect();

    let changed = ids_a
        .intersection(&ids_b)
        .filter(|id| a.get(id) != b.get(id))
        .copied()
        .collect();

    KindDrift {
        count_a: a.len(),
        count_b: b.len(),
        added: ids_b.difference(&ids_a).copied().collect(),
        removed: ids_a.difference(&ids_b).copied().collect(),
        changed,
    }
}
