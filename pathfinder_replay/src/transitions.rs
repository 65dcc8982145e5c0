/// Pathfinder replay: centralized transition logic.
///
/// ALL store mutation driven by a classified record lives here. Records
/// reaching this module have already passed `invariants::validate_shape`.

use serde_json::Value;

use crate::domain::{Connection, EntityKind, Mutation, Operation, Signature, System};
use crate::error::ReplayError;
use crate::events::{decode_items, EventRecord};
use crate::ids::{coerce_id, is_one};
use crate::invariants::{is_reactivation, is_system_cascade};
use crate::store::EntityStore;

// ---------------------------------------------------------------------------
// Public dispatcher
// ---------------------------------------------------------------------------

/// Apply a validated `record` as `operation` and return every mutation
/// it caused, in order.
///
/// Every fallible step (attribute decoding, duplicate detection) happens
/// before the store is written, so an `Err` leaves the store untouched.
pub fn apply_record(
    store: &mut EntityStore,
    record: &EventRecord,
    operation: Operation,
) -> Result<Vec<Mutation>, ReplayError> {
    let mutations = match (operation, record.kind) {
        (Operation::Creation, EntityKind::System) => created_system(store, record)?,
        (Operation::Creation, EntityKind::Connection) => created_connection(store, record)?,
        (Operation::Creation, EntityKind::Signature) => created_signature(store, record)?,
        (Operation::Update, EntityKind::System) => updated_system(store, record)?,
        (Operation::Update, EntityKind::Connection) => updated_connection(store, record)?,
        (Operation::Update, EntityKind::Signature) => updated_signature(store, record)?,
        (Operation::Deletion, EntityKind::System) => deleted_system(store, record),
        (Operation::Deletion, EntityKind::Connection) => deleted_connection(store, record),
        (Operation::Deletion, EntityKind::Signature) => deleted_signature(store, record),
    };
    store.observe_name(record.kind, record.object.id, &record.object.name);
    Ok(mutations)
}

// ---------------------------------------------------------------------------
// Individual transition handlers (private)
// ---------------------------------------------------------------------------

fn created_system(store: &mut EntityStore, record: &EventRecord) -> Result<Vec<Mutation>, ReplayError> {
    let fields = SystemFields::decode(record)?;
    let (system, mutation) = store.add_system(record.object.id, &record.object.name, record.at)?;
    fields.apply(system);
    Ok(vec![mutation])
}

fn created_connection(
    store: &mut EntityStore,
    record: &EventRecord,
) -> Result<Vec<Mutation>, ReplayError> {
    let fields = ConnectionFields::decode(record)?;
    let source = fields
        .source
        .ok_or_else(|| ReplayError::malformed("source.new is missing"))?;
    let target = fields
        .target
        .ok_or_else(|| ReplayError::malformed("target.new is missing"))?;
    let (connection, mutation) = store.add_connection(record.object.id, source, target, record.at)?;
    fields.apply(connection);
    Ok(vec![mutation])
}

fn created_signature(
    store: &mut EntityStore,
    record: &EventRecord,
) -> Result<Vec<Mutation>, ReplayError> {
    let fields = SignatureFields::decode(record)?;
    let (signature, mutation) =
        store.add_signature(record.object.id, &record.object.name, record.at)?;
    fields.apply(signature);
    Ok(vec![mutation])
}

fn updated_system(store: &mut EntityStore, record: &EventRecord) -> Result<Vec<Mutation>, ReplayError> {
    let fields = SystemFields::decode(record)?;
    let id = record.object.id;
    let name = &record.object.name;
    let (system, mutation) = if !store.contains(EntityKind::System, id) && is_reactivation(record) {
        store.reactivate_system(id, name, record.at)?
    } else {
        store.update_system(id, name, record.at)
    };
    fields.apply(system);
    Ok(vec![mutation])
}

fn updated_connection(
    store: &mut EntityStore,
    record: &EventRecord,
) -> Result<Vec<Mutation>, ReplayError> {
    let fields = ConnectionFields::decode(record)?;
    let (connection, mutation) = store.update_connection(record.object.id, record.at);
    fields.apply(connection);
    Ok(vec![mutation])
}

fn updated_signature(
    store: &mut EntityStore,
    record: &EventRecord,
) -> Result<Vec<Mutation>, ReplayError> {
    let fields = SignatureFields::decode(record)?;
    let (signature, mutation) =
        store.update_signature(record.object.id, &record.object.name, record.at);
    fields.apply(signature);
    Ok(vec![mutation])
}

/// Removes the object and every other system batched on the route.
fn deleted_system(store: &mut EntityStore, record: &EventRecord) -> Vec<Mutation> {
    let primary = record.object.id;
    let mut mutations = vec![store.delete_system(primary, record.at)];
    for &id in record.route.ids().iter().filter(|&&id| id != primary) {
        mutations.push(store.delete_system(id, record.at));
    }
    mutations
}

/// Removes the connection; when the deletion came through the system
/// route, the systems listed there are removed as well.
fn deleted_connection(store: &mut EntityStore, record: &EventRecord) -> Vec<Mutation> {
    let mut mutations = vec![store.delete_connection(record.object.id, record.at)];
    if is_system_cascade(record) {
        for &id in record.route.ids() {
            mutations.push(store.delete_system(id, record.at));
        }
    }
    mutations
}

fn deleted_signature(store: &mut EntityStore, record: &EventRecord) -> Vec<Mutation> {
    let primary = record.object.id;
    let mut mutations = vec![store.delete_signature(primary, record.at)];
    for &id in record.route.ids().iter().filter(|&&id| id != primary) {
        mutations.push(store.delete_signature(id, record.at));
    }
    mutations
}

// ---------------------------------------------------------------------------
// Decoded attributes
// ---------------------------------------------------------------------------

/// Optional system attributes carried by the diff. `None` means absent or
/// null, and leaves the stored value untouched.
struct SystemFields {
    /// `locked` is a one-way flag: `new == 1` sets it, any other value
    /// (including 0) leaves it as it was. The log has never been seen to
    /// unlock a system, so there is no reset path.
    lock: bool,
    status_id: Option<i64>,
    description: Option<String>,
    alias: Option<String>,
}

impl SystemFields {
    fn decode(record: &EventRecord) -> Result<Self, ReplayError> {
        Ok(Self {
            lock: record.new_value("locked").is_some_and(is_one),
            status_id: optional_i64(record, "statusId")?,
            description: optional_string(record, "description"),
            alias: optional_string(record, "alias"),
        })
    }

    fn apply(self, system: &mut System) {
        if self.lock {
            system.locked = Some(true);
        }
        if self.status_id.is_some() {
            system.status_id = self.status_id;
        }
        if self.description.is_some() {
            system.description = self.description;
        }
        if self.alias.is_some() {
            system.alias = self.alias;
        }
    }
}

struct ConnectionFields {
    source: Option<i64>,
    target: Option<i64>,
    scope: Option<String>,
    kinds: Option<Vec<String>>,
    source_endpoint_types: Option<Vec<String>>,
    target_endpoint_types: Option<Vec<String>>,
}

impl ConnectionFields {
    fn decode(record: &EventRecord) -> Result<Self, ReplayError> {
        Ok(Self {
            source: optional_i64(record, "source")?,
            target: optional_i64(record, "target")?,
            scope: optional_string(record, "scope"),
            kinds: optional_items(record, "type")?,
            source_endpoint_types: optional_items(record, "sourceEndpointType")?,
            target_endpoint_types: optional_items(record, "targetEndpointType")?,
        })
    }

    fn apply(self, connection: &mut Connection) {
        if self.source.is_some() {
            connection.source = self.source;
        }
        if self.target.is_some() {
            connection.target = self.target;
        }
        if self.scope.is_some() {
            connection.scope = self.scope;
        }
        if let Some(kinds) = self.kinds {
            connection.kinds = kinds;
        }
        if let Some(types) = self.source_endpoint_types {
            connection.source_endpoint_types = types;
        }
        if let Some(types) = self.target_endpoint_types {
            connection.target_endpoint_types = types;
        }
    }
}

struct SignatureFields {
    name: Option<String>,
    group_id: Option<i64>,
    type_id: Option<i64>,
    description: Option<String>,
    connection_id: Option<i64>,
}

impl SignatureFields {
    fn decode(record: &EventRecord) -> Result<Self, ReplayError> {
        Ok(Self {
            name: optional_string(record, "name"),
            group_id: optional_i64(record, "groupId")?,
            type_id: optional_i64(record, "typeId")?,
            description: optional_string(record, "description"),
            connection_id: optional_i64(record, "connectionId")?,
        })
    }

    fn apply(self, signature: &mut Signature) {
        if let Some(name) = self.name {
            signature.name = name;
        }
        if self.group_id.is_some() {
            signature.group_id = self.group_id;
        }
        if self.type_id.is_some() {
            signature.type_id = self.type_id;
        }
        if self.description.is_some() {
            signature.description = self.description;
        }
        if self.connection_id.is_some() {
            signature.connection_id = self.connection_id;
        }
    }
}

fn optional_i64(record: &EventRecord, field: &str) -> Result<Option<i64>, ReplayError> {
    match record.new_value(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => coerce_id(value, field).map(Some),
    }
}

fn optional_string(record: &EventRecord, field: &str) -> Option<String> {
    match record.new_value(field) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

fn optional_items(record: &EventRecord, field: &str) -> Result<Option<Vec<String>>, ReplayError> {
    record.new_value(field).map(decode_items).transpose()
}
