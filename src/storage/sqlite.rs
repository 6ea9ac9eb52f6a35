//! SQLite storage implementation.
//!
//! This module provides the local store using SQLite. It follows the
//! MutationContext pattern for transaction discipline and audit logging:
//! every write runs inside one IMMEDIATE transaction that also persists the
//! audit events recorded by the closure.

use crate::error::{Error, Result};
use crate::model::{
    DateRange, Entity, EntityKind, Feedback, FeedbackCategory, FieldUpdate, Plan, Trip, User,
};
use crate::storage::events::{get_events, insert_event, Event, EventType};
use crate::storage::schema::apply_schema;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Transaction};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

/// SQLite-based storage backend.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

/// Context for a mutation operation, tracking side effects.
///
/// Passed to mutation closures so they can record audit events that are
/// written in the same transaction.
pub struct MutationContext {
    /// Name of the operation being performed.
    pub op_name: String,
    /// Actor performing the operation.
    pub actor: String,
    /// Events to write at the end of the transaction.
    pub events: Vec<Event>,
}

impl MutationContext {
    /// Create a new mutation context.
    #[must_use]
    pub fn new(op_name: &str, actor: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            actor: actor.to_string(),
            events: Vec::new(),
        }
    }

    /// Record an event for this operation.
    pub fn record_event(&mut self, entity_type: &str, entity_id: &str, event_type: EventType) {
        self.events
            .push(Event::new(entity_type, entity_id, event_type, &self.actor));
    }

    /// Record an event with old/new values for field tracking.
    pub fn record_change(
        &mut self,
        entity_type: &str,
        entity_id: &str,
        event_type: EventType,
        old_value: Option<String>,
        new_value: Option<String>,
    ) {
        self.events.push(
            Event::new(entity_type, entity_id, event_type, &self.actor)
                .with_values(old_value, new_value),
        );
    }

    /// Record an event carrying a free-form comment.
    pub fn record_comment(
        &mut self,
        entity_type: &str,
        entity_id: &str,
        event_type: EventType,
        comment: &str,
    ) {
        self.events.push(
            Event::new(entity_type, entity_id, event_type, &self.actor).with_comment(comment),
        );
    }
}

/// Whether a save inserted a new row or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveKind {
    Created,
    Updated,
}

/// Result of applying a remote record to the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Created,
    Updated,
    /// Local copy is as new or newer; nothing written.
    Skipped,
}

/// Sort order for [`ListFilter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListOrder {
    #[default]
    CreatedDesc,
    CreatedAsc,
    UpdatedDesc,
}

impl ListOrder {
    const fn sql(self) -> &'static str {
        match self {
            Self::CreatedDesc => "created_at DESC, id DESC",
            Self::CreatedAsc => "created_at ASC, id ASC",
            Self::UpdatedDesc => "updated_at DESC, id DESC",
        }
    }
}

/// Filters for [`SqliteStorage::list_entities`].
///
/// `plan_id` and `bookmarked_only` only apply to trips and are ignored for
/// other kinds.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub order: ListOrder,
    /// `None` returns every match.
    pub limit: Option<u32>,
    pub plan_id: Option<String>,
    pub bookmarked_only: bool,
}

/// A pending remote write persisted in `sync_queue`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueItem {
    /// Monotonic position; drains run in ascending `seq`.
    pub seq: i64,
    pub kind: EntityKind,
    pub entity_id: String,
    /// Full record as it was when enqueued.
    pub entity: Entity,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl SqliteStorage {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Execute a mutation with the transaction protocol.
    ///
    /// This method:
    /// 1. Begins an IMMEDIATE transaction (for write locking)
    /// 2. Executes the mutation closure
    /// 3. Writes audit events
    /// 4. Commits (or rolls back on error)
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. The transaction is rolled back on error.
    pub fn mutate<F, R>(&mut self, op: &str, actor: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let mut ctx = MutationContext::new(op, actor);

        let result = f(&tx, &mut ctx)?;

        for event in &ctx.events {
            insert_event(&tx, event)?;
        }

        tx.commit()?;

        Ok(result)
    }

    // =================
    // Entity Operations
    // =================

    /// Insert or fully replace a record by id.
    ///
    /// `created_at` of an existing row is kept; every other column is
    /// overwritten.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the record fails validation, or a
    /// database error if the write fails.
    pub fn save_entity(&mut self, entity: &Entity, actor: &str) -> Result<SaveKind> {
        entity.validate().map_err(Error::InvalidArgument)?;

        self.mutate("save_entity", actor, |tx, ctx| {
            let kind = write_entity(tx, entity)?;
            let event = match kind {
                SaveKind::Created => EventType::EntityCreated,
                SaveKind::Updated => EventType::EntityUpdated,
            };
            ctx.record_change(
                entity.kind().as_str(),
                entity.id(),
                event,
                None,
                Some(format_timestamp(&entity.updated_at())),
            );
            Ok(kind)
        })
    }

    /// Get a record by kind and id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a stored row cannot be decoded.
    pub fn get_entity(&self, kind: EntityKind, id: &str) -> Result<Option<Entity>> {
        fetch_entity(&self.conn, kind, id)
    }

    /// List an owner's records of one kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_entities(
        &self,
        kind: EntityKind,
        owner_id: &str,
        filter: &ListFilter,
    ) -> Result<Vec<Entity>> {
        let mut conditions = vec!["owner_id = ?1".to_string()];
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(owner_id.to_string())];

        if kind == EntityKind::Trip {
            if let Some(plan_id) = &filter.plan_id {
                params.push(Box::new(plan_id.clone()));
                conditions.push(format!("plan_id = ?{}", params.len()));
            }
            if filter.bookmarked_only {
                conditions.push("bookmarked = 1".to_string());
            }
        }

        let mut sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY {}",
            columns(kind),
            kind.table(),
            conditions.join(" AND "),
            filter.order.sql()
        );
        if let Some(limit) = filter.limit {
            params.push(Box::new(limit));
            sql.push_str(&format!(" LIMIT ?{}", params.len()));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(params_refs.as_slice(), |row| map_entity_row(kind, row))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Delete a record. Returns `false` when nothing matched.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete_entity(&mut self, kind: EntityKind, id: &str, actor: &str) -> Result<bool> {
        self.mutate("delete_entity", actor, |tx, ctx| {
            let rows = tx.execute(
                &format!("DELETE FROM {} WHERE id = ?1", kind.table()),
                [id],
            )?;
            if rows > 0 {
                ctx.record_event(kind.as_str(), id, EventType::EntityDeleted);
            }
            Ok(rows > 0)
        })
    }

    /// Apply a narrow field update and return the resulting record.
    ///
    /// `updated_at` becomes the later of the stored value and `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the record doesn't exist, `InvalidArgument` if
    /// the packing index or mission id doesn't exist.
    pub fn update_field(
        &mut self,
        id: &str,
        update: &FieldUpdate,
        updated_at: DateTime<Utc>,
        actor: &str,
    ) -> Result<Entity> {
        let kind = update.kind();

        self.mutate("update_field", actor, |tx, ctx| {
            let mut entity = fetch_entity(tx, kind, id)?.ok_or_else(|| Error::not_found(kind, id))?;

            let (old, new) = match (update, &mut entity) {
                (FieldUpdate::Bookmarked { value }, Entity::Trip(trip)) => {
                    let old = trip.bookmarked;
                    trip.bookmarked = *value;
                    stamp(&mut trip.updated_at, updated_at);
                    tx.execute(
                        "UPDATE trips SET bookmarked = ?1, updated_at = ?2 WHERE id = ?3",
                        rusqlite::params![value, format_timestamp(&trip.updated_at), id],
                    )?;
                    (old.to_string(), value.to_string())
                }
                (FieldUpdate::PackingItemChecked { index, checked }, Entity::Trip(trip)) => {
                    let len = trip.packing_list.len();
                    let item = trip.packing_list.get_mut(*index).ok_or_else(|| {
                        Error::InvalidArgument(format!(
                            "packing item index {index} out of range ({len} items)"
                        ))
                    })?;
                    let old = format!("{}={}", item.name, item.checked);
                    item.checked = *checked;
                    let new = format!("{}={}", item.name, item.checked);
                    stamp(&mut trip.updated_at, updated_at);
                    tx.execute(
                        "UPDATE trips SET packing_list = ?1, updated_at = ?2 WHERE id = ?3",
                        rusqlite::params![
                            to_json(&trip.packing_list)?,
                            format_timestamp(&trip.updated_at),
                            id
                        ],
                    )?;
                    (old, new)
                }
                (FieldUpdate::MissionCompleted { mission_id, completed }, Entity::Trip(trip)) => {
                    let mission = trip
                        .missions
                        .iter_mut()
                        .find(|m| &m.id == mission_id)
                        .ok_or_else(|| {
                            Error::InvalidArgument(format!("no mission {mission_id} on trip {id}"))
                        })?;
                    let old = mission.completed;
                    mission.completed = *completed;
                    stamp(&mut trip.updated_at, updated_at);
                    tx.execute(
                        "UPDATE trips SET missions = ?1, updated_at = ?2 WHERE id = ?3",
                        rusqlite::params![
                            to_json(&trip.missions)?,
                            format_timestamp(&trip.updated_at),
                            id
                        ],
                    )?;
                    (format!("{mission_id}={old}"), format!("{mission_id}={completed}"))
                }
                (FieldUpdate::RewardPoints { value }, Entity::User(user)) => {
                    let old = user.reward_points;
                    user.reward_points = *value;
                    stamp(&mut user.updated_at, updated_at);
                    tx.execute(
                        "UPDATE users SET reward_points = ?1, updated_at = ?2 WHERE id = ?3",
                        rusqlite::params![value, format_timestamp(&user.updated_at), id],
                    )?;
                    (old.to_string(), value.to_string())
                }
                _ => {
                    return Err(Error::Other(format!(
                        "{} cannot be applied to {kind}",
                        update.field_name()
                    )));
                }
            };

            ctx.record_change(
                kind.as_str(),
                id,
                EventType::FieldUpdated,
                Some(old),
                Some(new),
            );
            Ok(entity)
        })
    }

    /// Write a remote record locally unless the local copy is as new or newer.
    ///
    /// The timestamp comparison and the write share one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is invalid or the write fails.
    pub fn merge_remote(&mut self, entity: &Entity, actor: &str) -> Result<MergeOutcome> {
        entity.validate().map_err(Error::InvalidArgument)?;

        self.mutate("merge_remote", actor, |tx, ctx| {
            let local = local_updated_at(tx, entity.kind(), entity.id())?;
            if local.is_some_and(|local| entity.updated_at() <= local) {
                return Ok(MergeOutcome::Skipped);
            }

            let outcome = match write_entity(tx, entity)? {
                SaveKind::Created => MergeOutcome::Created,
                SaveKind::Updated => MergeOutcome::Updated,
            };
            ctx.record_change(
                entity.kind().as_str(),
                entity.id(),
                EventType::Pulled,
                local.as_ref().map(format_timestamp),
                Some(format_timestamp(&entity.updated_at())),
            );
            Ok(outcome)
        })
    }

    /// Record a sync decision (conflict, dropped write) in the audit log.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn record_sync_event(
        &mut self,
        kind: EntityKind,
        id: &str,
        event_type: EventType,
        comment: &str,
        actor: &str,
    ) -> Result<()> {
        self.mutate("record_sync_event", actor, |_tx, ctx| {
            ctx.record_comment(kind.as_str(), id, event_type, comment);
            Ok(())
        })
    }

    /// Audit history for one record, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_events(&self, kind: EntityKind, id: &str, limit: Option<u32>) -> Result<Vec<Event>> {
        Ok(get_events(&self.conn, kind.as_str(), id, limit)?)
    }

    // ================
    // Queue Operations
    // ================

    /// Append a full record to the sync queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn queue_push(&mut self, entity: &Entity, enqueued_at: DateTime<Utc>) -> Result<QueueItem> {
        let payload = to_json(entity)?;
        self.conn.execute(
            "INSERT INTO sync_queue (entity_type, entity_id, payload, enqueued_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                entity.kind().as_str(),
                entity.id(),
                payload,
                format_timestamp(&enqueued_at)
            ],
        )?;

        Ok(QueueItem {
            seq: self.conn.last_insert_rowid(),
            kind: entity.kind(),
            entity_id: entity.id().to_string(),
            entity: entity.clone(),
            enqueued_at,
            attempts: 0,
            last_error: None,
            last_attempt_at: None,
        })
    }

    /// All queued items in enqueue order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a payload cannot be decoded.
    pub fn queue_items(&self) -> Result<Vec<QueueItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, entity_type, entity_id, payload, enqueued_at, attempts, last_error, last_attempt_at
             FROM sync_queue ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map([], map_queue_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Remove one queued item. Returns `false` if it was already gone.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn queue_remove(&mut self, seq: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM sync_queue WHERE seq = ?1", [seq])?;
        Ok(rows > 0)
    }

    /// Count a failed attempt against a queued item.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn queue_record_attempt(
        &mut self,
        seq: i64,
        error: &str,
        attempted_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE sync_queue
             SET attempts = attempts + 1, last_error = ?1, last_attempt_at = ?2
             WHERE seq = ?3",
            rusqlite::params![error, format_timestamp(&attempted_at), seq],
        )?;
        Ok(())
    }

    /// Number of queued items.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn queue_len(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sync_queue", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Remove every queued item, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn queue_clear(&mut self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM sync_queue", [])?)
    }
}

// ==============
// Row Conversion
// ==============

/// Canonical text form of a timestamp: RFC 3339, nanoseconds, `Z` suffix.
#[must_use]
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn stamp(current: &mut DateTime<Utc>, at: DateTime<Utc>) {
    if at > *current {
        *current = at;
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn timestamp_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn date_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(idx)?;
    text.parse().map_err(|e| conversion_error(idx, e))
}

fn json_column<T: DeserializeOwned>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| conversion_error(idx, e))
}

const fn columns(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::User => {
            "id, owner_id, display_name, email, home_city, reward_points, created_at, updated_at"
        }
        EntityKind::Plan => "id, owner_id, title, preferences, trip_ids, created_at, updated_at",
        EntityKind::Trip => {
            "id, owner_id, plan_id, destination, start_date, end_date, highlights, amenities, \
             schedule, packing_list, missions, bookmarked, chat, created_at, updated_at"
        }
        EntityKind::Feedback => {
            "id, owner_id, category, message, trip_id, rating, created_at, updated_at"
        }
    }
}

fn fetch_entity(conn: &Connection, kind: EntityKind, id: &str) -> Result<Option<Entity>> {
    let sql = format!("SELECT {} FROM {} WHERE id = ?1", columns(kind), kind.table());
    let entity = conn
        .query_row(&sql, [id], |row| map_entity_row(kind, row))
        .optional()?;
    Ok(entity)
}

fn local_updated_at(conn: &Connection, kind: EntityKind, id: &str) -> Result<Option<DateTime<Utc>>> {
    let sql = format!("SELECT updated_at FROM {} WHERE id = ?1", kind.table());
    let ts = conn
        .query_row(&sql, [id], |row| timestamp_column(row, 0))
        .optional()?;
    Ok(ts)
}

/// Upsert one record, keeping `created_at` of an existing row.
fn write_entity(conn: &Connection, entity: &Entity) -> Result<SaveKind> {
    let exists = conn
        .prepare(&format!("SELECT 1 FROM {} WHERE id = ?1", entity.kind().table()))?
        .exists([entity.id()])?;

    match entity {
        Entity::User(u) => {
            conn.execute(
                "INSERT INTO users (id, owner_id, display_name, email, home_city, reward_points, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                   owner_id = excluded.owner_id,
                   display_name = excluded.display_name,
                   email = excluded.email,
                   home_city = excluded.home_city,
                   reward_points = excluded.reward_points,
                   updated_at = excluded.updated_at",
                rusqlite::params![
                    u.id,
                    u.owner_id,
                    u.display_name,
                    u.email,
                    u.home_city,
                    u.reward_points,
                    format_timestamp(&u.created_at),
                    format_timestamp(&u.updated_at),
                ],
            )?;
        }
        Entity::Plan(p) => {
            conn.execute(
                "INSERT INTO plans (id, owner_id, title, preferences, trip_ids, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                   owner_id = excluded.owner_id,
                   title = excluded.title,
                   preferences = excluded.preferences,
                   trip_ids = excluded.trip_ids,
                   updated_at = excluded.updated_at",
                rusqlite::params![
                    p.id,
                    p.owner_id,
                    p.title,
                    to_json(&p.preferences)?,
                    to_json(&p.trip_ids)?,
                    format_timestamp(&p.created_at),
                    format_timestamp(&p.updated_at),
                ],
            )?;
        }
        Entity::Trip(t) => {
            conn.execute(
                "INSERT INTO trips (id, owner_id, plan_id, destination, start_date, end_date, highlights,
                                    amenities, schedule, packing_list, missions, bookmarked, chat,
                                    created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                 ON CONFLICT(id) DO UPDATE SET
                   owner_id = excluded.owner_id,
                   plan_id = excluded.plan_id,
                   destination = excluded.destination,
                   start_date = excluded.start_date,
                   end_date = excluded.end_date,
                   highlights = excluded.highlights,
                   amenities = excluded.amenities,
                   schedule = excluded.schedule,
                   packing_list = excluded.packing_list,
                   missions = excluded.missions,
                   bookmarked = excluded.bookmarked,
                   chat = excluded.chat,
                   updated_at = excluded.updated_at",
                rusqlite::params![
                    t.id,
                    t.owner_id,
                    t.plan_id,
                    to_json(&t.destination)?,
                    t.dates.start.to_string(),
                    t.dates.end.to_string(),
                    to_json(&t.highlights)?,
                    to_json(&t.amenities)?,
                    to_json(&t.schedule)?,
                    to_json(&t.packing_list)?,
                    to_json(&t.missions)?,
                    t.bookmarked,
                    to_json(&t.chat)?,
                    format_timestamp(&t.created_at),
                    format_timestamp(&t.updated_at),
                ],
            )?;
        }
        Entity::Feedback(f) => {
            // Feedback is write-once: only the timestamp may move.
            if let Some(Entity::Feedback(stored)) = fetch_entity(conn, EntityKind::Feedback, &f.id)? {
                if !stored.same_content(f) {
                    return Err(Error::InvalidArgument(format!(
                        "feedback {} cannot be edited after it is submitted",
                        f.id
                    )));
                }
            }
            conn.execute(
                "INSERT INTO feedback (id, owner_id, category, message, trip_id, rating, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                   updated_at = excluded.updated_at",
                rusqlite::params![
                    f.id,
                    f.owner_id,
                    f.category.as_str(),
                    f.message,
                    f.trip_id,
                    f.rating,
                    format_timestamp(&f.created_at),
                    format_timestamp(&f.updated_at),
                ],
            )?;
        }
    }

    Ok(if exists {
        SaveKind::Updated
    } else {
        SaveKind::Created
    })
}

fn map_entity_row(kind: EntityKind, row: &rusqlite::Row) -> rusqlite::Result<Entity> {
    Ok(match kind {
        EntityKind::User => Entity::User(map_user_row(row)?),
        EntityKind::Plan => Entity::Plan(map_plan_row(row)?),
        EntityKind::Trip => Entity::Trip(map_trip_row(row)?),
        EntityKind::Feedback => Entity::Feedback(map_feedback_row(row)?),
    })
}

// Helper to map user rows
fn map_user_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        display_name: row.get(2)?,
        email: row.get(3)?,
        home_city: row.get(4)?,
        reward_points: row.get(5)?,
        created_at: timestamp_column(row, 6)?,
        updated_at: timestamp_column(row, 7)?,
    })
}

// Helper to map plan rows
fn map_plan_row(row: &rusqlite::Row) -> rusqlite::Result<Plan> {
    Ok(Plan {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        preferences: json_column(row, 3)?,
        trip_ids: json_column(row, 4)?,
        created_at: timestamp_column(row, 5)?,
        updated_at: timestamp_column(row, 6)?,
    })
}

// Helper to map trip rows
fn map_trip_row(row: &rusqlite::Row) -> rusqlite::Result<Trip> {
    Ok(Trip {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        plan_id: row.get(2)?,
        destination: json_column(row, 3)?,
        dates: DateRange {
            start: date_column(row, 4)?,
            end: date_column(row, 5)?,
        },
        highlights: json_column(row, 6)?,
        amenities: json_column(row, 7)?,
        schedule: json_column(row, 8)?,
        packing_list: json_column(row, 9)?,
        missions: json_column(row, 10)?,
        bookmarked: row.get(11)?,
        chat: json_column(row, 12)?,
        created_at: timestamp_column(row, 13)?,
        updated_at: timestamp_column(row, 14)?,
    })
}

// Helper to map feedback rows
fn map_feedback_row(row: &rusqlite::Row) -> rusqlite::Result<Feedback> {
    let category: String = row.get(2)?;
    Ok(Feedback {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        category: FeedbackCategory::from_str(&category),
        message: row.get(3)?,
        trip_id: row.get(4)?,
        rating: row.get(5)?,
        created_at: timestamp_column(row, 6)?,
        updated_at: timestamp_column(row, 7)?,
    })
}

// Helper to map sync_queue rows
fn map_queue_row(row: &rusqlite::Row) -> rusqlite::Result<QueueItem> {
    let kind_str: String = row.get(1)?;
    let last_attempt: Option<String> = row.get(7)?;
    Ok(QueueItem {
        seq: row.get(0)?,
        kind: kind_str.parse().map_err(|e: String| conversion_error(1, e))?,
        entity_id: row.get(2)?,
        entity: json_column(row, 3)?,
        enqueued_at: timestamp_column(row, 4)?,
        attempts: row.get(5)?,
        last_error: row.get(6)?,
        last_attempt_at: last_attempt
            .map(|text| {
                DateTime::parse_from_rfc3339(&text)
                    .map(|ts| ts.with_timezone(&Utc))
                    .map_err(|e| conversion_error(7, e))
            })
            .transpose()?,
    })
}
