//! In-process remote store.
//!
//! Keeps remote rows in a map keyed by (kind, id). Supports failure
//! injection so sync behavior under flaky connectivity can be exercised
//! without a server, and counts calls so tests can assert on traffic.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::rows::{decode_rows, from_remote_row, to_remote_row};
use super::{RemoteError, RemoteStore};
use crate::model::{Entity, EntityKind};

/// Number of calls per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CallCounts {
    pub upserts: usize,
    pub fetches: usize,
    pub queries: usize,
    pub deletes: usize,
    pub pings: usize,
}

impl CallCounts {
    /// Calls that touched records (everything but pings).
    #[must_use]
    pub const fn total(&self) -> usize {
        self.upserts + self.fetches + self.queries + self.deletes
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    rows: BTreeMap<(EntityKind, String), serde_json::Value>,
    scripted: VecDeque<RemoteError>,
    rejected_ids: HashSet<String>,
    unreachable: bool,
    calls: CallCounts,
    upsert_log: Vec<String>,
}

/// In-memory [`RemoteStore`].
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    state: Mutex<MemoryState>,
    latency: Option<Duration>,
}

impl MemoryRemoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` (tokio time, so paused clocks apply).
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Seed a record directly, bypassing counters and failure injection.
    ///
    /// # Errors
    ///
    /// Returns `Rejected` if the entity cannot be mapped to a row.
    pub fn insert(&self, entity: &Entity) -> Result<(), RemoteError> {
        let row = to_remote_row(entity)?;
        self.state()
            .rows
            .insert((entity.kind(), entity.id().to_string()), row);
        Ok(())
    }

    /// Seed a raw row as stored remotely, whether or not it decodes.
    pub fn insert_row(&self, kind: EntityKind, id: &str, row: serde_json::Value) {
        self.state().rows.insert((kind, id.to_string()), row);
    }

    /// Current remote copy of a record.
    #[must_use]
    pub fn get(&self, kind: EntityKind, id: &str) -> Option<Entity> {
        let row = self.state().rows.get(&(kind, id.to_string())).cloned()?;
        from_remote_row(kind, row).ok()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state().rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fail the next `count` record calls with `error`.
    pub fn fail_next(&self, count: usize, error: &RemoteError) {
        let mut state = self.state();
        for _ in 0..count {
            state.scripted.push_back(error.clone());
        }
    }

    /// Reject every upsert of `id` with HTTP 422.
    pub fn reject_id(&self, id: &str) {
        self.state().rejected_ids.insert(id.to_string());
    }

    /// Simulate losing (or regaining) the network path to the remote.
    pub fn set_reachable(&self, reachable: bool) {
        self.state().unreachable = !reachable;
    }

    #[must_use]
    pub fn calls(&self) -> CallCounts {
        self.state().calls
    }

    /// Ids of successful upserts, in call order.
    #[must_use]
    pub fn upsert_log(&self) -> Vec<String> {
        self.state().upsert_log.clone()
    }

    fn injected_failure(state: &mut MemoryState) -> Option<RemoteError> {
        if state.unreachable {
            return Some(RemoteError::Unavailable("connection refused".into()));
        }
        state.scripted.pop_front()
    }
}

impl RemoteStore for MemoryRemoteStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, entity: &Entity) -> Result<(), RemoteError> {
        self.delay().await;
        let mut state = self.state();
        state.calls.upserts += 1;
        if let Some(err) = Self::injected_failure(&mut state) {
            return Err(err);
        }
        if state.rejected_ids.contains(entity.id()) {
            return Err(RemoteError::Rejected {
                status: 422,
                message: format!("row {} violates a check constraint", entity.id()),
            });
        }

        let row = to_remote_row(entity)?;
        state
            .rows
            .insert((entity.kind(), entity.id().to_string()), row);
        state.upsert_log.push(entity.id().to_string());
        Ok(())
    }

    async fn fetch_updated_at(
        &self,
        kind: EntityKind,
        id: &str,
    ) -> Result<Option<DateTime<Utc>>, RemoteError> {
        self.delay().await;
        let mut state = self.state();
        state.calls.fetches += 1;
        if let Some(err) = Self::injected_failure(&mut state) {
            return Err(err);
        }

        let Some(row) = state.rows.get(&(kind, id.to_string())) else {
            return Ok(None);
        };
        let updated_at = row
            .get("updated_at")
            .and_then(serde_json::Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|ts| ts.with_timezone(&Utc));
        Ok(updated_at)
    }

    async fn query_by_owner(
        &self,
        kind: EntityKind,
        owner_id: &str,
    ) -> Result<Vec<Entity>, RemoteError> {
        self.delay().await;
        let rows: Vec<serde_json::Value> = {
            let mut state = self.state();
            state.calls.queries += 1;
            if let Some(err) = Self::injected_failure(&mut state) {
                return Err(err);
            }
            state
                .rows
                .iter()
                .filter(|((k, _), row)| {
                    *k == kind && row.get("owner_id").and_then(|v| v.as_str()) == Some(owner_id)
                })
                .map(|(_, row)| row.clone())
                .collect()
        };

        Ok(decode_rows(kind, rows))
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<(), RemoteError> {
        self.delay().await;
        let mut state = self.state();
        state.calls.deletes += 1;
        if let Some(err) = Self::injected_failure(&mut state) {
            return Err(err);
        }
        state.rows.remove(&(kind, id.to_string()));
        Ok(())
    }

    async fn ping(&self) -> bool {
        let mut state = self.state();
        state.calls.pings += 1;
        !state.unreachable
    }
}
