/// Pathfinder replay: engine.
///
/// Top-level orchestrator. Parses, classifies, validates and hands each
/// record to transitions, in strict log order:
///
///   raw line → EventRecord → Operation → store mutation
///
/// The store is owned exclusively by the engine and is in a valid,
/// inspectable state between any two lines.

use serde_json::Value;
use tracing::debug;

use crate::classify::classify_checked;
use crate::domain::{AppliedRecord, RecordOutcome, SkipReason};
use crate::error::{RejectedRecord, ReplayError};
use crate::events::{channel_name, parse_line, ParsedLine};
use crate::invariants::validate_shape;
use crate::store::EntityStore;
use crate::transitions::apply_record;

/// Stateful engine around the entity store.
#[derive(Debug, Clone, Default)]
pub struct ReplayEngine {
    store: EntityStore,
    channel_filter: Option<String>,
    sequence: u64,
}

impl ReplayEngine {
    /// Create an engine with an empty store. With `channel_filter` set,
    /// only lines whose `channelName` matches exactly are processed.
    pub fn new(channel_filter: Option<String>) -> Self {
        Self {
            store: EntityStore::new(),
            channel_filter,
            sequence: 0,
        }
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn into_store(self) -> EntityStore {
        self.store
    }

    pub fn channel_filter(&self) -> Option<&str> {
        self.channel_filter.as_deref()
    }

    /// Number of lines fed so far, skipped ones included.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Apply a single decoded log line:
    ///   1. Channel filter
    ///   2. Parse (map noise is skipped here)
    ///   3. Classify and cross-check against the formatted text
    ///   4. Validate the record shape for its operation
    ///   5. Mutate the store
    ///
    /// A fatal error leaves the store exactly as it was before the line.
    pub fn apply_line(&mut self, line: &Value) -> Result<RecordOutcome, RejectedRecord> {
        self.sequence += 1;
        let sequence = self.sequence;
        self.apply(line).map_err(|source| RejectedRecord {
            sequence,
            record: line.to_string(),
            source,
        })
    }

    fn apply(&mut self, line: &Value) -> Result<RecordOutcome, ReplayError> {
        if let Some(filter) = self.channel_filter.as_deref() {
            if channel_name(line) != Some(filter) {
                return Ok(self.skipped(SkipReason::ChannelFiltered));
            }
        }

        let record = match parse_line(line)? {
            ParsedLine::Skip(reason) => return Ok(self.skipped(reason)),
            ParsedLine::Record(record) => record,
        };

        let operation = classify_checked(&record)?;
        validate_shape(&record, operation)?;
        let mutations = apply_record(&mut self.store, &record, operation)?;

        for m in &mutations {
            debug!(
                sequence = self.sequence,
                at = %record.at,
                actor = %record.actor,
                kind = %m.kind(),
                id = m.id(),
                recovery = m.is_recovery(),
                "{} {}",
                operation,
                record.kind
            );
        }

        Ok(RecordOutcome::Applied(AppliedRecord {
            operation,
            kind: record.kind,
            id: record.object.id,
            actor: record.actor,
            at: record.at,
            mutations,
        }))
    }

    fn skipped(&self, reason: SkipReason) -> RecordOutcome {
        debug!(sequence = self.sequence, ?reason, "line skipped");
        RecordOutcome::Skipped(reason)
    }

    /// Apply an ordered sequence of lines, stopping at the first fatal error.
    pub fn apply_sequence<'a, I>(&mut self, lines: I) -> Result<&EntityStore, RejectedRecord>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        for line in lines {
            self.apply_line(line)?;
        }
        Ok(&self.store)
    }

    /// Reset to an empty store and replay from scratch.
    pub fn replay<'a, I>(&mut self, lines: I) -> Result<&EntityStore, RejectedRecord>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        self.store = EntityStore::new();
        self.sequence = 0;
        self.apply_sequence(lines)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::{EntityKind, Mutation, Operation};

    fn line(message: &str, path: &str, main: Value, object: (i64, &str), formatted: &str) -> Value {
        json!({
            "message": message,
            "datetime": "2023-10-27T07:38:33.856015+00:00",
            "context": {"data": {
                "main": main,
                "object": {"objId": object.0, "objName": object.1},
                "character": {"name": "Qunibbra Do"},
                "channel": {"channelName": "SRG-C"},
                "formatted": formatted
            }},
            "extra": {"path": path}
        })
    }

    fn create_system(id: i64, name: &str) -> Value {
        line(
            &format!("system {}", id),
            "/api/rest/System",
            json!({"active": {"old": null, "new": 1}}),
            (id, name),
            &format!("Created system '{}'", name),
        )
    }

    #[test]
    fn test_created_system_lands_in_store() {
        let mut engine = ReplayEngine::new(None);
        let outcome = engine.apply_line(&create_system(12345, "J123456")).unwrap();
        let RecordOutcome::Applied(applied) = outcome else {
            panic!("expected applied record");
        };
        assert_eq!(applied.operation, Operation::Creation);
        assert_eq!(applied.mutations, vec![Mutation::Added { kind: EntityKind::System, id: 12345 }]);
        let system = engine.store().system(12345).unwrap();
        assert_eq!(system.id, 12345);
        assert_eq!(system.name, "J123456");
    }

    #[test]
    fn test_channel_filter_skips_other_channels() {
        let mut engine = ReplayEngine::new(Some("OTHER".into()));
        let outcome = engine.apply_line(&create_system(1, "J1")).unwrap();
        assert_eq!(outcome, RecordOutcome::Skipped(SkipReason::ChannelFiltered));
        assert!(engine.store().is_empty());
        assert_eq!(engine.sequence(), 1);
    }

    #[test]
    fn test_rejected_record_carries_line_verbatim() {
        let mut engine = ReplayEngine::new(None);
        engine.apply_line(&create_system(1, "J1")).unwrap();
        let dup = create_system(1, "J1");
        let err = engine.apply_line(&dup).unwrap_err();
        assert_eq!(err.sequence, 2);
        assert_eq!(err.record, dup.to_string());
        assert_eq!(err.source, ReplayError::DuplicateEntity { kind: EntityKind::System, id: 1 });
    }

    #[test]
    fn test_mismatched_formatted_text_is_fatal_and_store_untouched() {
        let mut engine = ReplayEngine::new(None);
        let bad = line(
            "system 1",
            "/api/rest/System",
            json!({"active": {"old": null, "new": 1}}),
            (1, "J1"),
            "Updated system 'J1'",
        );
        let err = engine.apply_line(&bad).unwrap_err();
        assert!(matches!(err.source, ReplayError::ClassificationMismatch { .. }));
        assert!(engine.store().is_empty());
    }

    #[test]
    fn test_reactivation_creates_absent_system() {
        let mut engine = ReplayEngine::new(None);
        let reactivate = line(
            "system 9",
            "/api/Map/updateData",
            json!({"active": {"old": 0, "new": 1}, "statusId": {"old": 1, "new": 2}}),
            (9, "J9"),
            "Updated system 'J9'",
        );
        let RecordOutcome::Applied(applied) = engine.apply_line(&reactivate).unwrap() else {
            panic!("expected applied record");
        };
        assert_eq!(applied.mutations, vec![Mutation::Reactivated { kind: EntityKind::System, id: 9 }]);
        assert_eq!(engine.store().system(9).unwrap().status_id, Some(2));
    }

    #[test]
    fn test_channel_filter_runs_before_parsing() {
        let mut engine = ReplayEngine::new(Some("SRG-C".into()));
        let mut foreign = line(
            "structure 5",
            "/api/rest/Structure",
            Value::Null,
            (5, "Astrahus"),
            "Created structure 'Astrahus'",
        );
        foreign["context"]["data"]["channel"]["channelName"] = json!("OTHER");
        assert_eq!(
            engine.apply_line(&foreign).unwrap(),
            RecordOutcome::Skipped(SkipReason::ChannelFiltered)
        );

        foreign["context"]["data"]["channel"]["channelName"] = json!("SRG-C");
        let err = engine.apply_line(&foreign).unwrap_err();
        assert!(matches!(err.source, ReplayError::UnknownMessageType { .. }));
    }

    #[test]
    fn test_rejected_creation_leaves_store_untouched() {
        let mut engine = ReplayEngine::new(None);
        let warm = line(
            "system 1",
            "/api/rest/System",
            json!({"active": {"old": null, "new": 1}, "statusId": {"old": null, "new": "warm"}}),
            (1, "J1"),
            "Created system 'J1'",
        );
        let err = engine.apply_line(&warm).unwrap_err();
        assert!(matches!(err.source, ReplayError::MalformedRecord { .. }));
        assert_eq!(engine.store(), &EntityStore::new());
        assert_eq!(engine.store().observed_name(EntityKind::System, 1), None);
    }

    #[test]
    fn test_rejected_update_does_not_recreate() {
        let mut engine = ReplayEngine::new(None);
        engine.apply_line(&create_system(3, "J3")).unwrap();
        let before = engine.store().clone();

        let fractional = line(
            "system 7",
            "/api/Map/updateData",
            json!({"statusId": {"old": 1, "new": 2.5}}),
            (7, "J7"),
            "Updated system 'J7'",
        );
        assert!(engine.apply_line(&fractional).is_err());

        let stale = line(
            "system 3",
            "/api/Map/updateData",
            json!({"statusId": {"old": 1, "new": "hot"}}),
            (3, "J3"),
            "Updated system 'J3'",
        );
        assert!(engine.apply_line(&stale).is_err());

        assert!(engine.store().system(7).is_none());
        assert_eq!(engine.store(), &before);
    }

    #[test]
    fn test_replay_resets_store() {
        let mut engine = ReplayEngine::new(None);
        let lines = vec![create_system(1, "J1"), create_system(2, "J2")];
        engine.apply_sequence(&lines).unwrap();
        let first = engine.store().clone();
        let second = engine.replay(&lines).unwrap().clone();
        assert_eq!(first, second);
        assert_eq!(engine.sequence(), 2);
    }
}
