/// Pathfinder replay: in-memory entity store.
///
/// One map per entity kind, keyed by id. Creation of an existing id is
/// fatal. Update or deletion of an absent id is recovered (the log may
/// start mid-stream) and reported as a recovery mutation with a warning.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{Connection, EntityId, EntityKind, Mutation, Signature, System};
use crate::error::ReplayError;

/// Current systems, connections and signatures, plus the first name
/// observed for every `(kind, id)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityStore {
    pub systems: BTreeMap<EntityId, System>,
    pub connections: BTreeMap<EntityId, Connection>,
    pub signatures: BTreeMap<EntityId, Signature>,
    #[serde(skip)]
    observed_names: BTreeMap<(EntityKind, EntityId), String>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -- observed names -----------------------------------------------------

    /// Remember the first name reported for an id. Later names that
    /// differ are logged and ignored.
    pub fn observe_name(&mut self, kind: EntityKind, id: EntityId, name: &str) {
        match self.observed_names.entry((kind, id)) {
            Entry::Vacant(e) => {
                e.insert(name.to_string());
            }
            Entry::Occupied(e) if e.get() != name => {
                debug!(%kind, id, first = %e.get(), reported = name, "object name changed");
            }
            Entry::Occupied(_) => {}
        }
    }

    pub fn observed_name(&self, kind: EntityKind, id: EntityId) -> Option<&str> {
        self.observed_names.get(&(kind, id)).map(String::as_str)
    }

    // -- systems ------------------------------------------------------------

    pub fn system(&self, id: EntityId) -> Option<&System> {
        self.systems.get(&id)
    }

    pub fn add_system(
        &mut self,
        id: EntityId,
        name: &str,
        at: DateTime<Utc>,
    ) -> Result<(&mut System, Mutation), ReplayError> {
        let kind = EntityKind::System;
        match self.systems.entry(id) {
            Entry::Occupied(_) => Err(ReplayError::DuplicateEntity { kind, id }),
            Entry::Vacant(e) => Ok((e.insert(System::new(id, name, at)), Mutation::Added { kind, id })),
        }
    }

    /// Refresh `name` and `last_seen_at`. An absent id is recreated.
    pub fn update_system(
        &mut self,
        id: EntityId,
        name: &str,
        at: DateTime<Utc>,
    ) -> (&mut System, Mutation) {
        let kind = EntityKind::System;
        match self.systems.entry(id) {
            Entry::Occupied(e) => {
                let system = e.into_mut();
                system.name = name.to_string();
                system.last_seen_at = at;
                (system, Mutation::Updated { kind, id })
            }
            Entry::Vacant(e) => {
                warn!(id, name, %at, "update of unknown system, recreating it");
                (e.insert(System::new(id, name, at)), Mutation::Recreated { kind, id })
            }
        }
    }

    /// Insert a system that an update switched back on. Unlike
    /// `update_system`'s recovery this is expected and not warned about.
    pub fn reactivate_system(
        &mut self,
        id: EntityId,
        name: &str,
        at: DateTime<Utc>,
    ) -> Result<(&mut System, Mutation), ReplayError> {
        let (system, _) = self.add_system(id, name, at)?;
        Ok((system, Mutation::Reactivated { kind: EntityKind::System, id }))
    }

    pub fn delete_system(&mut self, id: EntityId, at: DateTime<Utc>) -> Mutation {
        let kind = EntityKind::System;
        if self.systems.remove(&id).is_some() {
            Mutation::Removed { kind, id }
        } else {
            warn!(id, %at, "delete of unknown system ignored");
            Mutation::MissingOnDelete { kind, id }
        }
    }

    // -- connections --------------------------------------------------------

    pub fn connection(&self, id: EntityId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn add_connection(
        &mut self,
        id: EntityId,
        source: EntityId,
        target: EntityId,
        at: DateTime<Utc>,
    ) -> Result<(&mut Connection, Mutation), ReplayError> {
        let kind = EntityKind::Connection;
        match self.connections.entry(id) {
            Entry::Occupied(_) => Err(ReplayError::DuplicateEntity { kind, id }),
            Entry::Vacant(e) => {
                let mut connection = Connection::new(id, at);
                connection.source = Some(source);
                connection.target = Some(target);
                Ok((e.insert(connection), Mutation::Added { kind, id }))
            }
        }
    }

    /// Refresh `last_seen_at`. An absent id is recreated without endpoints;
    /// the caller fills in whatever the update carries.
    pub fn update_connection(&mut self, id: EntityId, at: DateTime<Utc>) -> (&mut Connection, Mutation) {
        let kind = EntityKind::Connection;
        match self.connections.entry(id) {
            Entry::Occupied(e) => {
                let connection = e.into_mut();
                connection.last_seen_at = at;
                (connection, Mutation::Updated { kind, id })
            }
            Entry::Vacant(e) => {
                warn!(id, %at, "update of unknown connection, recreating it");
                (e.insert(Connection::new(id, at)), Mutation::Recreated { kind, id })
            }
        }
    }

    pub fn delete_connection(&mut self, id: EntityId, at: DateTime<Utc>) -> Mutation {
        let kind = EntityKind::Connection;
        if self.connections.remove(&id).is_some() {
            Mutation::Removed { kind, id }
        } else {
            warn!(id, %at, "delete of unknown connection ignored");
            Mutation::MissingOnDelete { kind, id }
        }
    }

    // -- signatures ---------------------------------------------------------

    pub fn signature(&self, id: EntityId) -> Option<&Signature> {
        self.signatures.get(&id)
    }

    pub fn add_signature(
        &mut self,
        id: EntityId,
        name: &str,
        at: DateTime<Utc>,
    ) -> Result<(&mut Signature, Mutation), ReplayError> {
        let kind = EntityKind::Signature;
        match self.signatures.entry(id) {
            Entry::Occupied(_) => Err(ReplayError::DuplicateEntity { kind, id }),
            Entry::Vacant(e) => Ok((e.insert(Signature::new(id, name, at)), Mutation::Added { kind, id })),
        }
    }

    pub fn update_signature(
        &mut self,
        id: EntityId,
        name: &str,
        at: DateTime<Utc>,
    ) -> (&mut Signature, Mutation) {
        let kind = EntityKind::Signature;
        match self.signatures.entry(id) {
            Entry::Occupied(e) => {
                let signature = e.into_mut();
                signature.name = name.to_string();
                signature.last_seen_at = at;
                (signature, Mutation::Updated { kind, id })
            }
            Entry::Vacant(e) => {
                warn!(id, name, %at, "update of unknown signature, recreating it");
                (e.insert(Signature::new(id, name, at)), Mutation::Recreated { kind, id })
            }
        }
    }

    pub fn delete_signature(&mut self, id: EntityId, at: DateTime<Utc>) -> Mutation {
        let kind = EntityKind::Signature;
        if self.signatures.remove(&id).is_some() {
            Mutation::Removed { kind, id }
        } else {
            warn!(id, %at, "delete of unknown signature ignored");
            Mutation::MissingOnDelete { kind, id }
        }
    }

    // -- generic ------------------------------------------------------------

    pub fn contains(&self, kind: EntityKind, id: EntityId) -> bool {
        match kind {
            EntityKind::System => self.systems.contains_key(&id),
            EntityKind::Connection => self.connections.contains_key(&id),
            EntityKind::Signature => self.signatures.contains_key(&id),
        }
    }

    pub fn len(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::System => self.systems.len(),
            EntityKind::Connection => self.connections.len(),
            EntityKind::Signature => self.signatures.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty() && self.connections.is_empty() && self.signatures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(sec: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 10, 27, 7, 38, sec).unwrap()
    }

    #[test]
    fn test_add_system_sets_both_timestamps() {
        let mut store = EntityStore::new();
        let (system, m) = store.add_system(12345, "J123456", at(1)).unwrap();
        assert_eq!(system.first_seen_at, at(1));
        assert_eq!(system.last_seen_at, at(1));
        assert_eq!(m, Mutation::Added { kind: EntityKind::System, id: 12345 });
        assert_eq!(store.system(12345).unwrap().name, "J123456");
    }

    #[test]
    fn test_duplicate_system_is_fatal() {
        let mut store = EntityStore::new();
        store.add_system(1, "J1", at(1)).unwrap();
        let err = store.add_system(1, "J1", at(2)).unwrap_err();
        assert_eq!(err, ReplayError::DuplicateEntity { kind: EntityKind::System, id: 1 });
    }

    #[test]
    fn test_system_names_need_not_be_unique() {
        let mut store = EntityStore::new();
        store.add_system(1, "Jita", at(1)).unwrap();
        store.add_system(2, "Jita", at(2)).unwrap();
        assert_eq!(store.len(EntityKind::System), 2);
    }

    #[test]
    fn test_update_existing_system_keeps_first_seen() {
        let mut store = EntityStore::new();
        store.add_system(1, "J1", at(1)).unwrap();
        let (system, m) = store.update_system(1, "J1", at(9));
        system.status_id = Some(3);
        assert_eq!(m, Mutation::Updated { kind: EntityKind::System, id: 1 });
        let system = store.system(1).unwrap();
        assert_eq!(system.first_seen_at, at(1));
        assert_eq!(system.last_seen_at, at(9));
        assert_eq!(system.status_id, Some(3));
    }

    #[test]
    fn test_update_missing_system_recreates_it() {
        let mut store = EntityStore::new();
        let (_, m) = store.update_system(5, "J5", at(4));
        assert!(m.is_recovery());
        assert_eq!(m, Mutation::Recreated { kind: EntityKind::System, id: 5 });
        assert_eq!(store.system(5).unwrap().first_seen_at, at(4));
    }

    #[test]
    fn test_update_equals_create_then_update() {
        let mut recovered = EntityStore::new();
        recovered.update_system(5, "J5", at(4)).0.status_id = Some(2);

        let mut full = EntityStore::new();
        full.add_system(5, "J5", at(4)).unwrap();
        full.update_system(5, "J5", at(4)).0.status_id = Some(2);

        assert_eq!(recovered.systems, full.systems);
    }

    #[test]
    fn test_reactivation_is_not_a_recovery() {
        let mut store = EntityStore::new();
        let (_, m) = store.reactivate_system(8, "J8", at(1)).unwrap();
        assert_eq!(m, Mutation::Reactivated { kind: EntityKind::System, id: 8 });
        assert!(!m.is_recovery());
        assert!(store.reactivate_system(8, "J8", at(2)).is_err());
    }

    #[test]
    fn test_double_delete_is_idempotent() {
        let mut store = EntityStore::new();
        store.add_system(1, "J1", at(1)).unwrap();
        assert_eq!(
            store.delete_system(1, at(2)),
            Mutation::Removed { kind: EntityKind::System, id: 1 }
        );
        let after_first = store.clone();
        assert_eq!(
            store.delete_system(1, at(3)),
            Mutation::MissingOnDelete { kind: EntityKind::System, id: 1 }
        );
        assert_eq!(store, after_first);
    }

    #[test]
    fn test_connection_lifecycle() {
        let mut store = EntityStore::new();
        store.add_connection(7, 1, 2, at(1)).unwrap();
        assert!(store.add_connection(7, 1, 2, at(1)).is_err());
        let (c, m) = store.update_connection(7, at(5));
        c.scope = Some("wh".into());
        assert_eq!(m, Mutation::Updated { kind: EntityKind::Connection, id: 7 });
        assert_eq!(store.connection(7).unwrap().scope.as_deref(), Some("wh"));
        assert_eq!(
            store.delete_connection(7, at(6)),
            Mutation::Removed { kind: EntityKind::Connection, id: 7 }
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_recreated_connection_has_no_endpoints() {
        let mut store = EntityStore::new();
        let (c, m) = store.update_connection(9, at(1));
        assert_eq!(c.source, None);
        assert_eq!(m, Mutation::Recreated { kind: EntityKind::Connection, id: 9 });
    }

    #[test]
    fn test_signature_lifecycle() {
        let mut store = EntityStore::new();
        store.add_signature(55, "ABC-123", at(1)).unwrap();
        let (s, _) = store.update_signature(55, "ABC-123", at(2));
        s.connection_id = Some(7);
        assert_eq!(store.signature(55).unwrap().connection_id, Some(7));
        assert!(!store.delete_signature(55, at(3)).is_recovery());
        assert!(store.delete_signature(55, at(4)).is_recovery());
    }

    #[test]
    fn test_observed_name_keeps_first() {
        let mut store = EntityStore::new();
        store.observe_name(EntityKind::System, 1, "J1");
        store.observe_name(EntityKind::System, 1, "Renamed");
        store.observe_name(EntityKind::Connection, 1, "wh");
        assert_eq!(store.observed_name(EntityKind::System, 1), Some("J1"));
        assert_eq!(store.observed_name(EntityKind::Connection, 1), Some("wh"));
        assert_eq!(store.observed_name(EntityKind::Signature, 1), None);
    }
}
