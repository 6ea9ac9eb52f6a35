//! Mapping between entities and remote rows.
//!
//! A remote row is a flat JSON object whose keys mirror the local columns:
//! the sync envelope, scalar fields, and nested fields as native JSON. The
//! only structural difference from the model is that a trip's date range is
//! split into `start_date` and `end_date` columns.

use serde_json::{Map, Value};
use tracing::warn;

use super::RemoteError;
use crate::model::{Entity, EntityKind};

/// Convert an entity to its remote row.
///
/// # Errors
///
/// Returns `Rejected` if the entity cannot be serialized.
pub fn to_remote_row(entity: &Entity) -> Result<Value, RemoteError> {
    let value = match entity {
        Entity::User(u) => serde_json::to_value(u),
        Entity::Plan(p) => serde_json::to_value(p),
        Entity::Trip(t) => serde_json::to_value(t),
        Entity::Feedback(f) => serde_json::to_value(f),
    }
    .map_err(|e| malformed(entity.kind(), &e))?;

    let Value::Object(mut row) = value else {
        return Err(malformed(entity.kind(), &"not an object"));
    };

    if entity.kind() == EntityKind::Trip {
        if let Some(Value::Object(mut dates)) = row.remove("dates") {
            row.insert("start_date".into(), dates.remove("start").unwrap_or(Value::Null));
            row.insert("end_date".into(), dates.remove("end").unwrap_or(Value::Null));
        }
    }

    Ok(Value::Object(row))
}

/// Decode a query result, dropping rows that don't match the model.
pub fn decode_rows(kind: EntityKind, rows: Vec<Value>) -> Vec<Entity> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.get("id").and_then(Value::as_str).unwrap_or("?").to_string();
            match from_remote_row(kind, row) {
                Ok(entity) => Some(entity),
                Err(err) => {
                    warn!(%kind, id = %id, error = %err, "Ignoring undecodable remote row");
                    None
                }
            }
        })
        .collect()
}

/// Convert a remote row back to an entity of `kind`.
///
/// Unknown columns are ignored, so the remote may carry extra bookkeeping.
///
/// # Errors
///
/// Returns `Rejected` with status 0 if the row doesn't match the model.
pub fn from_remote_row(kind: EntityKind, row: Value) -> Result<Entity, RemoteError> {
    let Value::Object(mut row) = row else {
        return Err(malformed(kind, &"row is not an object"));
    };

    if kind == EntityKind::Trip && !row.contains_key("dates") {
        let mut dates = Map::new();
        if let Some(start) = row.remove("start_date") {
            dates.insert("start".into(), start);
        }
        if let Some(end) = row.remove("end_date") {
            dates.insert("end".into(), end);
        }
        row.insert("dates".into(), Value::Object(dates));
    }

    strip_nulls(&mut row);
    row.insert("kind".into(), Value::String(kind.as_str().into()));

    serde_json::from_value(Value::Object(row)).map_err(|e| malformed(kind, &e))
}

// PostgREST returns SQL NULL for empty optional and defaulted columns.
fn strip_nulls(row: &mut Map<String, Value>) {
    row.retain(|_, v| !v.is_null());
}

fn malformed(kind: EntityKind, err: &dyn std::fmt::Display) -> RemoteError {
    RemoteError::Rejected {
        status: 0,
        message: format!("malformed {kind} row: {err}"),
    }
}
