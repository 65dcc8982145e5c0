/// Pathfinder replay: per-kind record shape checks.
///
/// Hard-fail validation run after classification and before the store is
/// touched. A failure means the log format or the route table has moved
/// on; it is never a data-quality problem to recover from.

use serde_json::Value;

use crate::domain::{EntityKind, Operation};
use crate::error::ReplayError;
use crate::events::{EventRecord, Route};
use crate::ids::{is_one, is_truthy};

const CONNECTION_NAMES: [&str; 2] = ["wh", "stargate"];
const CONNECTION_SCOPES: [&str; 2] = ["wh", "stargate"];
/// Encoded `type` of a connection on creation, compared verbatim.
const CREATED_CONNECTION_TYPES: [&str; 2] = [r#"["wh_fresh"]"#, r#"["stargate"]"#];

const CREATED_SYSTEM_FIELDS: &[&str] = &["active", "locked", "statusId"];
const CREATED_CONNECTION_FIELDS: &[&str] = &["source", "target", "scope", "type"];
const CREATED_SIGNATURE_FIELDS: &[&str] = &["groupId", "typeId", "name", "description"];
const UPDATED_SYSTEM_FIELDS: &[&str] =
    &["active", "locked", "statusId", "description", "alias", "rallyPoke"];
const UPDATED_CONNECTION_FIELDS: &[&str] = &[
    "source",
    "target",
    "type",
    "scope",
    "sourceEndpointType",
    "targetEndpointType",
];
const UPDATED_SIGNATURE_FIELDS: &[&str] =
    &["groupId", "typeId", "name", "description", "connectionId"];

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Validate `record` against the shape expected for `operation`.
pub fn validate_shape(record: &EventRecord, operation: Operation) -> Result<(), ReplayError> {
    let check = Check { record, operation };
    match (operation, record.kind) {
        (Operation::Creation, EntityKind::System) => check.created_system(),
        (Operation::Creation, EntityKind::Connection) => check.created_connection(),
        (Operation::Creation, EntityKind::Signature) => check.created_signature(),
        (Operation::Update, EntityKind::System) => check.updated_system(),
        (Operation::Update, EntityKind::Connection) => check.updated_connection(),
        (Operation::Update, EntityKind::Signature) => check.updated_signature(),
        (Operation::Deletion, EntityKind::System) => check.deleted_system(),
        (Operation::Deletion, EntityKind::Connection) => check.deleted_connection(),
        (Operation::Deletion, EntityKind::Signature) => check.deleted_signature(),
    }
}

// ---------------------------------------------------------------------------
// Individual checks (private)
// ---------------------------------------------------------------------------

struct Check<'a> {
    record: &'a EventRecord,
    operation: Operation,
}

impl Check<'_> {
    fn fail(&self, reason: impl Into<String>) -> ReplayError {
        ReplayError::shape(self.operation, self.record.kind, reason)
    }

    fn ensure(&self, ok: bool, reason: impl FnOnce() -> String) -> Result<(), ReplayError> {
        if ok {
            Ok(())
        } else {
            Err(self.fail(reason()))
        }
    }

    fn unexpected_route(&self) -> ReplayError {
        self.fail(format!("unexpected route {}", self.record.route.base()))
    }

    fn route_ids_empty(&self, ids: &[i64]) -> Result<(), ReplayError> {
        self.ensure(ids.is_empty(), || {
            format!("route {} carries ids {:?}", self.record.route.base(), ids)
        })
    }

    /// Ids are either absent or exactly the object's id.
    fn route_ids_empty_or_object(&self, ids: &[i64]) -> Result<(), ReplayError> {
        let id = self.record.object.id;
        self.ensure(ids.is_empty() || ids == [id], || {
            format!("route ids {:?} do not name object {}", ids, id)
        })
    }

    fn route_ids_contain_object(&self, ids: &[i64]) -> Result<(), ReplayError> {
        let id = self.record.object.id;
        self.ensure(ids.contains(&id), || {
            format!("route ids {:?} do not include object {}", ids, id)
        })
    }

    fn allowed_fields(&self, allowed: &[&str]) -> Result<(), ReplayError> {
        let extra: Vec<&str> = self
            .record
            .field_names()
            .filter(|f| !allowed.contains(f))
            .collect();
        self.ensure(extra.is_empty(), || format!("unexpected fields {:?}", extra))
    }

    /// Field must be present with a non-empty diff and a null `old`.
    fn fresh_field(&self, field: &str) -> Result<&Value, ReplayError> {
        let diff = self
            .record
            .diff(field)
            .ok_or_else(|| self.fail(format!("missing field {:?}", field)))?;
        self.ensure(diff.old.is_null(), || {
            format!("{:?}.old is {} on creation", field, diff.old)
        })?;
        Ok(&diff.new)
    }

    fn connection_literal(&self) -> Result<(), ReplayError> {
        let name = self.record.object.name.as_str();
        self.ensure(CONNECTION_NAMES.contains(&name), || {
            format!("connection objName {:?} is neither wh nor stargate", name)
        })?;
        let quoted = format!("'{}'", name);
        self.ensure(self.record.target == quoted, || {
            format!("target {:?} does not match objName {:?}", self.record.target, name)
        })
    }

    fn scope_if_present(&self) -> Result<(), ReplayError> {
        if let Some(scope) = self.record.new_value("scope") {
            let ok = scope.as_str().is_some_and(|s| CONNECTION_SCOPES.contains(&s));
            self.ensure(ok, || format!("scope {} is neither wh nor stargate", scope))?;
        }
        Ok(())
    }

    fn endpoints_not_null(&self) -> Result<(), ReplayError> {
        for field in ["source", "target"] {
            if let Some(new) = self.record.new_value(field) {
                self.ensure(!new.is_null(), || format!("{:?}.new is null", field))?;
            }
        }
        Ok(())
    }

    // -- creations ----------------------------------------------------------

    fn created_system(&self) -> Result<(), ReplayError> {
        match &self.record.route {
            Route::MapUpdateUserData => {}
            Route::RestSystem(ids) => self.route_ids_empty(ids)?,
            _ => return Err(self.unexpected_route()),
        }
        let active = self.fresh_field("active")?;
        self.ensure(is_one(active), || format!("active.new is {} on creation", active))?;
        self.allowed_fields(CREATED_SYSTEM_FIELDS)
    }

    fn created_connection(&self) -> Result<(), ReplayError> {
        self.connection_literal()?;
        match &self.record.route {
            Route::MapUpdateUserData => {}
            Route::RestConnection(ids) => self.route_ids_empty(ids)?,
            _ => return Err(self.unexpected_route()),
        }
        self.fresh_field("source")?;
        self.fresh_field("target")?;
        self.endpoints_not_null()?;
        self.allowed_fields(CREATED_CONNECTION_FIELDS)?;
        self.scope_if_present()?;
        if let Some(kinds) = self.record.new_value("type") {
            let ok = kinds.as_str().is_some_and(|k| CREATED_CONNECTION_TYPES.contains(&k));
            self.ensure(ok, || format!("new connection type {}", kinds))?;
        }
        Ok(())
    }

    fn created_signature(&self) -> Result<(), ReplayError> {
        match &self.record.route {
            Route::RestSignature(ids) => self.route_ids_empty(ids)?,
            _ => return Err(self.unexpected_route()),
        }
        self.allowed_fields(CREATED_SIGNATURE_FIELDS)?;
        self.fresh_field("groupId")?;
        self.fresh_field("typeId")?;
        self.fresh_field("description")?;
        let name = self.fresh_field("name")?;
        let object_name = self.record.object.name.as_str();
        self.ensure(name.as_str() == Some(object_name), || {
            format!("name.new {} differs from objName {:?}", name, object_name)
        })
    }

    // -- updates ------------------------------------------------------------

    fn updated_system(&self) -> Result<(), ReplayError> {
        match &self.record.route {
            Route::MapUpdateUserData | Route::MapUpdateData => {}
            Route::RestSystem(ids) => self.route_ids_empty_or_object(ids)?,
            _ => return Err(self.unexpected_route()),
        }
        self.allowed_fields(UPDATED_SYSTEM_FIELDS)
    }

    fn updated_connection(&self) -> Result<(), ReplayError> {
        self.connection_literal()?;
        match &self.record.route {
            Route::MapUpdateUserData | Route::MapUpdateData | Route::MapUpdateUnloadData => {}
            Route::RestConnection(ids) => self.route_ids_empty(ids)?,
            _ => return Err(self.unexpected_route()),
        }
        self.endpoints_not_null()?;
        self.scope_if_present()?;
        self.allowed_fields(UPDATED_CONNECTION_FIELDS)
    }

    fn updated_signature(&self) -> Result<(), ReplayError> {
        match &self.record.route {
            Route::RestSignature(ids) => self.route_ids_empty_or_object(ids)?,
            _ => return Err(self.unexpected_route()),
        }
        self.allowed_fields(UPDATED_SIGNATURE_FIELDS)
    }

    // -- deletions ----------------------------------------------------------

    fn deleted_system(&self) -> Result<(), ReplayError> {
        match &self.record.route {
            Route::RestSystem(ids) => self.route_ids_contain_object(ids)?,
            _ => return Err(self.unexpected_route()),
        }
        let quoted = format!("'{}'", self.record.object.name);
        self.ensure(self.record.target == quoted, || {
            format!(
                "target {:?} does not match objName {:?}",
                self.record.target, self.record.object.name
            )
        })
    }

    fn deleted_connection(&self) -> Result<(), ReplayError> {
        self.connection_literal()?;
        match &self.record.route {
            Route::RestConnection(ids) => {
                let id = self.record.object.id;
                self.ensure(ids.as_slice() == [id], || {
                    format!("route ids {:?} are not exactly connection {}", ids, id)
                })
            }
            Route::CronDeleteEolConnections | Route::CronDeleteExpiredConnections => Ok(()),
            Route::RestSystem(ids) => self.ensure(!ids.is_empty(), || {
                "system route without ids deleted a connection".to_string()
            }),
            _ => Err(self.unexpected_route()),
        }
    }

    fn deleted_signature(&self) -> Result<(), ReplayError> {
        match &self.record.route {
            Route::RestSignature(ids) if ids.is_empty() => Ok(()),
            Route::RestSignature(ids) => self.route_ids_contain_object(ids),
            _ => Err(self.unexpected_route()),
        }
    }
}

/// True when a connection deletion also removed the systems on its route.
pub fn is_system_cascade(record: &EventRecord) -> bool {
    record.kind == EntityKind::Connection && matches!(record.route, Route::RestSystem(_))
}

/// An update that switches `active` on for a system.
pub fn is_reactivation(record: &EventRecord) -> bool {
    record.kind == EntityKind::System
        && record.new_value("active").is_some_and(is_truthy)
}
