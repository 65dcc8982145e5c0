/// Pathfinder replay: canonical store hashing.
///
/// Deterministic canonical serialization + SHA-256 hashing of an
/// `EntityStore`, used to prove that two replays converged.
///
/// Rules:
///   - Entities in ascending id order, per kind
///   - Fixed field order inside every entity
///   - Timestamps as RFC 3339 with whole seconds
///   - UTF-8 JSON, no whitespace
///   - The observed-name cache is not part of the state

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::store::EntityStore;
use crate::STORE_FORMAT_VERSION;

/// Canonical serialization of the store to UTF-8 JSON bytes.
pub fn canonical_serialize(store: &EntityStore) -> Vec<u8> {
    build_canonical_value(store).to_string().into_bytes()
}

/// SHA-256 of the canonical serialization. Lowercase hex string.
pub fn canonical_hash(store: &EntityStore) -> String {
    let digest = Sha256::digest(canonical_serialize(store));
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Field order: store_format_version, systems, connections, signatures.
fn build_canonical_value(store: &EntityStore) -> Value {
    // BTreeMap iteration is already in id order.
    let systems: Vec<Value> = store
        .systems
        .values()
        .map(|s| {
            let mut m = Map::new();
            m.insert("id".into(), s.id.into());
            m.insert("name".into(), s.name.clone().into());
            m.insert("first_seen_at".into(), timestamp(&s.first_seen_at));
            m.insert("last_seen_at".into(), timestamp(&s.last_seen_at));
            m.insert("locked".into(), s.locked.map_or(Value::Null, Value::Bool));
            m.insert("status_id".into(), s.status_id.map_or(Value::Null, Value::from));
            m.insert("description".into(), optional_str(&s.description));
            m.insert("alias".into(), optional_str(&s.alias));
            Value::Object(m)
        })
        .collect();

    let connections: Vec<Value> = store
        .connections
        .values()
        .map(|c| {
            let mut m = Map::new();
            m.insert("id".into(), c.id.into());
            m.insert("source".into(), c.source.map_or(Value::Null, Value::from));
            m.insert("target".into(), c.target.map_or(Value::Null, Value::from));
            m.insert("first_seen_at".into(), timestamp(&c.first_seen_at));
            m.insert("last_seen_at".into(), timestamp(&c.last_seen_at));
            m.insert("scope".into(), optional_str(&c.scope));
            m.insert("kinds".into(), strings(&c.kinds));
            m.insert("source_endpoint_types".into(), strings(&c.source_endpoint_types));
            m.insert("target_endpoint_types".into(), strings(&c.target_endpoint_types));
            Value::Object(m)
        })
        .collect();

    let signatures: Vec<Value> = store
        .signatures
        .values()
        .map(|s| {
            let mut m = Map::new();
            m.insert("id".into(), s.id.into());
            m.insert("name".into(), s.name.clone().into());
            m.insert("first_seen_at".into(), timestamp(&s.first_seen_at));
            m.insert("last_seen_at".into(), timestamp(&s.last_seen_at));
            m.insert("group_id".into(), s.group_id.map_or(Value::Null, Value::from));
            m.insert("type_id".into(), s.type_id.map_or(Value::Null, Value::from));
            m.insert("description".into(), optional_str(&s.description));
            m.insert("connection_id".into(), s.connection_id.map_or(Value::Null, Value::from));
            Value::Object(m)
        })
        .collect();

    let mut root = Map::new();
    root.insert("store_format_version".into(), STORE_FORMAT_VERSION.into());
    root.insert("systems".into(), Value::Array(systems));
    root.insert("connections".into(), Value::Array(connections));
    root.insert("signatures".into(), Value::Array(signatures));
    Value::Object(root)
}

fn timestamp(at: &DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn optional_str(s: &Option<String>) -> Value {
    s.as_ref().map_or(Value::Null, |s| Value::String(s.clone()))
}

fn strings(items: &[String]) -> Value {
    Value::Array(items.iter().cloned().map(Value::String).collect())
}
