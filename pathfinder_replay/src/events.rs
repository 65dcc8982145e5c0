/// Pathfinder replay: audit record parsing.
///
/// Turns one decoded log line into an `EventRecord`. Records carry data
/// only; classification and store mutation happen downstream.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use serde_json::Value;

use crate::domain::{EntityId, EntityKind, SkipReason};
use crate::error::ReplayError;
use crate::ids::{coerce_id, parse_path_id};

/// Wire format of `datetime`, e.g. `2023-10-27T07:38:33.856015+00:00`.
/// The fraction is always six digits; a missing or shorter one is rejected.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S.%6f+00:00";

const REST_CONNECTION: &str = "/api/rest/Connection";
const REST_SYSTEM: &str = "/api/rest/System";
const REST_SIGNATURE: &str = "/api/rest/Signature";
const REST_MAP: &str = "/api/rest/Map/";

// ---------------------------------------------------------------------------
// Record types
// ---------------------------------------------------------------------------

/// First word of `message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Entity(EntityKind),
    Map,
}

impl MessageType {
    pub fn parse(word: &str) -> Result<Self, ReplayError> {
        match word {
            "system" => Ok(MessageType::Entity(EntityKind::System)),
            "connection" => Ok(MessageType::Entity(EntityKind::Connection)),
            "signature" => Ok(MessageType::Entity(EntityKind::Signature)),
            "map" => Ok(MessageType::Map),
            other => Err(ReplayError::UnknownMessageType {
                message_type: other.to_string(),
            }),
        }
    }
}

/// The API route that produced a record. Only used for cross-validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    CronDeleteEolConnections,
    CronDeleteExpiredConnections,
    MapUpdateData,
    MapUpdateUserData,
    MapUpdateUnloadData,
    RestConnection(Vec<EntityId>),
    RestSystem(Vec<EntityId>),
    RestSignature(Vec<EntityId>),
}

impl Route {
    /// Classify `extra.path`. Returns `Ok(None)` for map-creation routes.
    pub fn parse(path: &str) -> Result<Option<Self>, ReplayError> {
        let route = match path {
            "/cron/deleteEolConnections" => Route::CronDeleteEolConnections,
            "/cron/deleteExpiredConnections" => Route::CronDeleteExpiredConnections,
            "/api/Map/updateData" => Route::MapUpdateData,
            "/api/Map/updateUserData" => Route::MapUpdateUserData,
            "/api/Map/updateUnloadData" => Route::MapUpdateUnloadData,
            _ => {
                if let Some(ids) = trailing_ids(path, REST_CONNECTION)? {
                    Route::RestConnection(ids)
                } else if let Some(ids) = trailing_ids(path, REST_SYSTEM)? {
                    Route::RestSystem(ids)
                } else if let Some(ids) = trailing_ids(path, REST_SIGNATURE)? {
                    Route::RestSignature(ids)
                } else if path.starts_with(REST_MAP) {
                    return Ok(None);
                } else {
                    return Err(ReplayError::UnrecognizedPath {
                        path: path.to_string(),
                    });
                }
            }
        };
        Ok(Some(route))
    }

    /// The route without its trailing id segment.
    pub fn base(&self) -> &'static str {
        match self {
            Route::CronDeleteEolConnections => "/cron/deleteEolConnections",
            Route::CronDeleteExpiredConnections => "/cron/deleteExpiredConnections",
            Route::MapUpdateData => "/api/Map/updateData",
            Route::MapUpdateUserData => "/api/Map/updateUserData",
            Route::MapUpdateUnloadData => "/api/Map/updateUnloadData",
            Route::RestConnection(_) => REST_CONNECTION,
            Route::RestSystem(_) => REST_SYSTEM,
            Route::RestSignature(_) => REST_SIGNATURE,
        }
    }

    /// Ids embedded in the trailing segment; empty for routes without one.
    pub fn ids(&self) -> &[EntityId] {
        match self {
            Route::RestConnection(ids) | Route::RestSystem(ids) | Route::RestSignature(ids) => {
                ids.as_slice()
            }
            _ => &[],
        }
    }
}

/// `/api/rest/System` → `[]`, `/api/rest/System/1,2` → `[1, 2]`,
/// anything not under `base` → `None`.
fn trailing_ids(path: &str, base: &str) -> Result<Option<Vec<EntityId>>, ReplayError> {
    let Some(rest) = path.strip_prefix(base) else {
        return Ok(None);
    };
    let segment = if rest.is_empty() {
        rest
    } else if let Some(segment) = rest.strip_prefix('/') {
        segment
    } else {
        return Ok(None);
    };
    if segment.is_empty() {
        return Ok(Some(Vec::new()));
    }
    segment
        .split(',')
        .map(parse_path_id)
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// One `{old, new}` pair from `context.data.main`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDiff {
    pub old: Value,
    pub new: Value,
}

/// `context.data.object`: the entity identity as the server reports it
/// after the event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub id: EntityId,
    pub name: String,
}

/// A parsed audit record for a system, connection or signature.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub kind: EntityKind,
    /// Raw id literal after the message type (`'wh'`, `'J123456'`, `12345`).
    pub target: String,
    pub actor: String,
    /// Event time truncated to whole seconds.
    pub at: DateTime<Utc>,
    pub route: Route,
    pub object: ObjectRef,
    /// `None` when the log carried no diff (or an empty one).
    pub diffs: Option<BTreeMap<String, FieldDiff>>,
    pub formatted: String,
}

impl EventRecord {
    pub fn diff(&self, field: &str) -> Option<&FieldDiff> {
        self.diffs.as_ref().and_then(|d| d.get(field))
    }

    /// The post-event value of `field`, if the diff mentions it.
    pub fn new_value(&self, field: &str) -> Option<&Value> {
        self.diff(field).map(|d| &d.new)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.diffs.iter().flat_map(|d| d.keys().map(String::as_str))
    }
}

/// Result of parsing one line.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    Skip(SkipReason),
    Record(EventRecord),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// `context.data.channel.channelName`, if present.
pub fn channel_name(line: &Value) -> Option<&str> {
    line.pointer("/context/data/channel/channelName")
        .and_then(Value::as_str)
}

/// Parse one decoded log line.
///
/// Map messages and map-creation routes come back as `ParsedLine::Skip`.
pub fn parse_line(line: &Value) -> Result<ParsedLine, ReplayError> {
    let message = require_str(line, "/message")?;
    let (word, target) = message
        .split_once(' ')
        .ok_or_else(|| ReplayError::malformed(format!("message {:?} has no target id", message)))?;

    let kind = match MessageType::parse(word)? {
        MessageType::Map => return Ok(ParsedLine::Skip(SkipReason::MapMessage)),
        MessageType::Entity(kind) => kind,
    };

    let route = match Route::parse(require_str(line, "/extra/path")?)? {
        Some(route) => route,
        None => return Ok(ParsedLine::Skip(SkipReason::MapRoute)),
    };

    let at = parse_timestamp(require_str(line, "/datetime")?)?;
    let actor = require_str(line, "/context/data/character/name")?.to_string();
    let formatted = require_str(line, "/context/data/formatted")?.to_string();

    let object = ObjectRef {
        id: coerce_id(require(line, "/context/data/object/objId")?, "objId")?,
        name: require_str(line, "/context/data/object/objName")?.to_string(),
    };

    let diffs = match line.pointer("/context/data/main") {
        None | Some(Value::Null) => None,
        Some(Value::Object(main)) if main.is_empty() => None,
        Some(Value::Object(main)) => {
            let mut diffs = BTreeMap::new();
            for (field, pair) in main {
                let pair = pair.as_object().ok_or_else(|| {
                    ReplayError::malformed(format!("diff for {:?} is not an object", field))
                })?;
                diffs.insert(
                    field.clone(),
                    FieldDiff {
                        old: pair.get("old").cloned().unwrap_or(Value::Null),
                        new: pair.get("new").cloned().unwrap_or(Value::Null),
                    },
                );
            }
            Some(diffs)
        }
        Some(other) => {
            return Err(ReplayError::malformed(format!(
                "context.data.main is not an object: {}",
                other
            )))
        }
    };

    Ok(ParsedLine::Record(EventRecord {
        kind,
        target: target.to_string(),
        actor,
        at,
        route,
        object,
        diffs,
        formatted,
    }))
}

/// Parse `datetime` and drop the fractional seconds.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ReplayError> {
    let naive = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map_err(|e| ReplayError::malformed(format!("bad datetime {:?}: {}", raw, e)))?;
    Ok(naive.trunc_subsecs(0).and_utc())
}

/// Decode a `type` / endpoint-type value: a JSON array literal string
/// (`'["wh_fresh","wh_jump_mass_l"]'`) or a bare scalar (`'stargate'`).
pub fn decode_items(value: &Value) -> Result<Vec<String>, ReplayError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(s) if s.is_empty() => Ok(Vec::new()),
        Value::String(s) if s.contains('[') => serde_json::from_str::<Vec<String>>(s)
            .map_err(|e| ReplayError::malformed(format!("bad item list {:?}: {}", s, e))),
        Value::String(s) => Ok(vec![s.clone()]),
        other => Err(ReplayError::malformed(format!("item list is not a string: {}", other))),
    }
}

fn require<'a>(line: &'a Value, pointer: &str) -> Result<&'a Value, ReplayError> {
    line.pointer(pointer)
        .ok_or_else(|| ReplayError::malformed(format!("missing {}", pointer)))
}

fn require_str<'a>(line: &'a Value, pointer: &str) -> Result<&'a str, ReplayError> {
    require(line, pointer)?
        .as_str()
        .ok_or_else(|| ReplayError::malformed(format!("{} is not a string", pointer)))
}
