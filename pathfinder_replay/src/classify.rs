/// Pathfinder replay: operation classification.
///
/// The log never says outright whether a record created, updated or
/// deleted its entity. The operation is reconstructed from the shape of
/// the diff, then cross-checked against the formatted summary.

use crate::domain::{EntityKind, Operation};
use crate::error::ReplayError;
use crate::events::EventRecord;
use crate::ids::is_truthy;

/// Diff fields that only ever appear on an entity that already exists.
pub fn definitive_update_fields(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Signature => &["connectionId"],
        EntityKind::System => &["description"],
        EntityKind::Connection => &["sourceEndpointType", "targetEndpointType"],
    }
}

/// Decide the operation from the diff alone.
///
///   1. No diff, or `active` going truthy → falsy: deletion.
///   2. Any definitive update field for the kind: update.
///   3. Any field with a non-null `old`: update.
///   4. Otherwise: creation.
pub fn classify(record: &EventRecord) -> Operation {
    let Some(diffs) = record.diffs.as_ref() else {
        return Operation::Deletion;
    };

    if let Some(active) = diffs.get("active") {
        if is_truthy(&active.old) && !is_truthy(&active.new) {
            return Operation::Deletion;
        }
    }

    let markers = definitive_update_fields(record.kind);
    let updated = diffs
        .iter()
        .any(|(field, diff)| markers.contains(&field.as_str()) || !diff.old.is_null());

    if updated {
        Operation::Update
    } else {
        Operation::Creation
    }
}

/// The formatted summary must start with e.g. `"Updated system"`.
pub fn check_formatted(record: &EventRecord, operation: Operation) -> Result<(), ReplayError> {
    let expected = format!("{} {}", operation.verb(), record.kind.as_str());
    if record.formatted.starts_with(&expected) {
        Ok(())
    } else {
        Err(ReplayError::ClassificationMismatch {
            operation,
            kind: record.kind,
            formatted: record.formatted.clone(),
        })
    }
}

/// Classify and cross-check in one step.
pub fn classify_checked(record: &EventRecord) -> Result<Operation, ReplayError> {
    let operation = classify(record);
    check_formatted(record, operation)?;
    Ok(operation)
}
