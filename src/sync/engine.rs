//! The sync orchestrator.
//!
//! [`SyncEngine`] is the only type callers need: it writes through the local
//! store, pushes to the remote when it can, and falls back to the persisted
//! queue when it can't. Conflicts are resolved per record by comparing
//! `updated_at`; the strictly newer copy wins and equal timestamps keep the
//! write.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::retry::retry_with_backoff_while;
use super::types::{PullReport, PushOutcome, SaveOutcome, SyncAllReport, SyncSettings, SyncStatus};
use crate::error::{Error, Result};
use crate::model::{Entity, EntityKind, FieldUpdate};
use crate::network::NetworkMonitor;
use crate::queue::{DrainResult, ItemOutcome, QueueItem, SyncQueue};
use crate::remote::{RemoteError, RemoteStore};
use crate::storage::events::EventType;
use crate::storage::{format_timestamp, lock, ListFilter, SharedStorage};

#[derive(Debug, Default)]
struct EngineState {
    last_attempt: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// Offline-first sync facade over the local store, the queue and a remote.
///
/// Construct one per database and share it behind an `Arc`.
pub struct SyncEngine<R: RemoteStore> {
    storage: SharedStorage,
    queue: SyncQueue,
    remote: R,
    network: Arc<NetworkMonitor>,
    settings: SyncSettings,
    state: Mutex<EngineState>,
}

impl<R: RemoteStore> SyncEngine<R> {
    #[must_use]
    pub fn new(
        storage: SharedStorage,
        remote: R,
        network: Arc<NetworkMonitor>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            queue: SyncQueue::new(Arc::clone(&storage)),
            storage,
            remote,
            network,
            settings,
            state: Mutex::new(EngineState::default()),
        }
    }

    #[must_use]
    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    #[must_use]
    pub fn remote(&self) -> &R {
        &self.remote
    }

    #[must_use]
    pub fn network(&self) -> &Arc<NetworkMonitor> {
        &self.network
    }

    #[must_use]
    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    // ==========
    // Writes
    // ==========

    /// Persist a full record locally, then push it or queue it.
    ///
    /// The local write always happens first. Remote trouble never fails the
    /// call: it turns into [`SaveOutcome::Queued`].
    ///
    /// # Errors
    ///
    /// Returns an error only if the record is invalid or the local store
    /// (including the queue) fails.
    pub async fn save(&self, entity: &Entity) -> Result<SaveOutcome> {
        let saved = lock(&self.storage)?.save_entity(entity, &self.settings.actor)?;
        debug!(kind = %entity.kind(), id = entity.id(), ?saved, "Saved locally");
        self.push_or_enqueue(entity).await
    }

    /// Apply a narrow field update with a fresh `updated_at`, then sync the
    /// resulting record the same way as [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the record doesn't exist locally and
    /// `InvalidArgument` if the update targets a missing list element.
    pub async fn update_field(&self, id: &str, update: &FieldUpdate) -> Result<SaveOutcome> {
        let entity =
            lock(&self.storage)?.update_field(id, update, Utc::now(), &self.settings.actor)?;
        debug!(kind = %entity.kind(), id, field = update.field_name(), "Field updated locally");
        self.push_or_enqueue(&entity).await
    }

    /// Delete locally, then remotely if online.
    ///
    /// The remote delete is best-effort and never queued. Returns whether a
    /// local record was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the local delete fails.
    pub async fn delete(&self, kind: EntityKind, id: &str) -> Result<bool> {
        let deleted = lock(&self.storage)?.delete_entity(kind, id, &self.settings.actor)?;

        if self.network.is_online() {
            let call = tokio::time::timeout(self.settings.remote_timeout, self.remote.delete(kind, id));
            match call.await {
                Ok(Ok(())) => debug!(%kind, id, "Deleted remotely"),
                Ok(Err(e)) => warn!(%kind, id, error = %e, "Remote delete failed; not retried"),
                Err(_) => warn!(%kind, id, "Remote delete timed out; not retried"),
            }
        } else {
            debug!(%kind, id, "Offline; remote delete skipped");
        }

        Ok(deleted)
    }

    /// Delete a plan's trips, then the plan. Returns the number of trips
    /// deleted.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the plan doesn't exist locally.
    pub async fn delete_plan_cascade(&self, plan_id: &str) -> Result<usize> {
        let trips = {
            let storage = lock(&self.storage)?;
            let plan = storage
                .get_entity(EntityKind::Plan, plan_id)?
                .ok_or_else(|| Error::not_found(EntityKind::Plan, plan_id))?;
            let filter = ListFilter {
                plan_id: Some(plan_id.to_string()),
                ..ListFilter::default()
            };
            storage.list_entities(EntityKind::Trip, plan.owner_id(), &filter)?
        };

        for trip in &trips {
            self.delete(EntityKind::Trip, trip.id()).await?;
        }
        self.delete(EntityKind::Plan, plan_id).await?;
        info!(plan_id, trips = trips.len(), "Plan deleted with its trips");
        Ok(trips.len())
    }

    // ==========
    // Reads
    // ==========

    /// Read one record from the local store.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Entity>> {
        lock(&self.storage)?.get_entity(kind, id)
    }

    /// List an owner's records from the local store.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list(&self, kind: EntityKind, owner_id: &str, filter: &ListFilter) -> Result<Vec<Entity>> {
        lock(&self.storage)?.list_entities(kind, owner_id, filter)
    }

    // ==========
    // Remote
    // ==========

    /// Push one record unless the remote copy is strictly newer.
    ///
    /// Safe to repeat: upserts replace by id. A skipped push is logged and
    /// recorded in the audit log; the newer remote copy is not written back.
    ///
    /// # Errors
    ///
    /// Returns the remote failure of either the timestamp fetch or the upsert.
    pub async fn save_to_remote_with_timestamp_check(
        &self,
        entity: &Entity,
    ) -> std::result::Result<PushOutcome, RemoteError> {
        let kind = entity.kind();
        let id = entity.id();
        let local = entity.updated_at();

        if let Some(remote) = self.remote.fetch_updated_at(kind, id).await? {
            if remote > local {
                warn!(
                    %kind,
                    id,
                    local = %format_timestamp(&local),
                    remote = %format_timestamp(&remote),
                    "Remote copy is newer; push skipped"
                );
                let comment = format!(
                    "remote updated_at {} is newer than local {}",
                    format_timestamp(&remote),
                    format_timestamp(&local)
                );
                self.audit(kind, id, EventType::ConflictSkipped, &comment);
                return Ok(PushOutcome::ConflictSkipped);
            }
        }

        self.remote.upsert(entity).await?;
        debug!(%kind, id, remote = self.remote.name(), "Upserted");
        Ok(PushOutcome::Upserted)
    }

    /// Push every queued write once, in order.
    ///
    /// Transient failures stay queued. Rejected writes stay queued until
    /// they have been rejected `max_rejections` times, then they are dropped
    /// and logged.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue table cannot be read or updated.
    pub async fn drain_queue(&self) -> Result<DrainResult> {
        self.mark_attempt();
        let result = self.queue.drain(move |item| self.push_queued(item)).await?;
        if let DrainResult::Completed(report) = &result {
            if report.retried == 0 && report.dropped == 0 && report.remaining == 0 {
                self.state().last_error = None;
            }
        }
        Ok(result)
    }

    async fn push_queued(&self, item: QueueItem) -> ItemOutcome {
        let err = match self.save_to_remote_with_timestamp_check(&item.entity).await {
            Ok(_) => return ItemOutcome::Done,
            Err(err) => err,
        };
        self.note_error(&err);

        let attempts = item.attempts + 1;
        if err.is_transient() || attempts < self.settings.max_rejections {
            return ItemOutcome::Retry(err.to_string());
        }

        error!(
            kind = %item.kind,
            id = %item.entity_id,
            seq = item.seq,
            attempts,
            error = %err,
            "Remote keeps rejecting write; dropping it"
        );
        let comment = format!("dropped after {attempts} rejected attempts: {err}");
        self.audit(item.kind, &item.entity_id, EventType::QueueDropped, &comment);
        ItemOutcome::Drop(err.to_string())
    }

    /// Drain the queue now.
    ///
    /// # Errors
    ///
    /// Returns `Error::Offline` when offline, or a queue storage error.
    pub async fn manual_sync(&self) -> Result<DrainResult> {
        if !self.network.is_online() {
            return Err(Error::Offline("manual sync"));
        }
        self.drain_queue().await
    }

    /// Fetch an owner's records of every kind and apply the newer ones.
    ///
    /// A remote record is written locally only if there is no local copy or
    /// its `updated_at` is strictly newer.
    ///
    /// # Errors
    ///
    /// Returns `Error::Offline` when offline, `Error::Remote` when a query
    /// still fails after retries, or a local store error.
    pub async fn pull(&self, owner_id: &str) -> Result<PullReport> {
        if !self.network.is_online() {
            return Err(Error::Offline("pull"));
        }
        self.mark_attempt();

        let mut report = PullReport::new(owner_id);
        for kind in EntityKind::ALL {
            let remote = &self.remote;
            let fetched = retry_with_backoff_while(&self.settings.retry, RemoteError::is_transient, move || {
                remote.query_by_owner(kind, owner_id)
            })
            .await;
            let records = match fetched {
                Ok(records) => records,
                Err(err) => {
                    self.note_error(&err);
                    return Err(err.into());
                }
            };

            let stats = report.stats_mut(kind);
            {
                let mut storage = lock(&self.storage)?;
                for entity in &records {
                    if entity.owner_id() != owner_id {
                        warn!(%kind, id = entity.id(), "Remote returned a foreign record; ignored");
                        stats.rejected += 1;
                        continue;
                    }
                    match storage.merge_remote(entity, &self.settings.actor) {
                        Ok(outcome) => stats.record(outcome),
                        Err(Error::InvalidArgument(reason)) => {
                            warn!(%kind, id = entity.id(), %reason, "Remote record not applied");
                            stats.rejected += 1;
                        }
                        Err(err) => return Err(err),
                    }
                }
            }
            debug!(
                %kind,
                created = stats.created,
                updated = stats.updated,
                skipped = stats.skipped,
                rejected = stats.rejected,
                "Pulled"
            );
        }

        info!(owner_id, applied = report.total_applied(), seen = report.total_processed(), "Pull complete");
        Ok(report)
    }

    /// Push every local record of an owner, then drain the queue.
    ///
    /// Records whose push fails are queued and retried by the closing drain.
    ///
    /// # Errors
    ///
    /// Returns `Error::Offline` when offline, or a local store error.
    pub async fn sync_all(&self, owner_id: &str) -> Result<SyncAllReport> {
        if !self.network.is_online() {
            return Err(Error::Offline("sync all"));
        }
        self.mark_attempt();

        let mut pushed = 0;
        let mut conflicts = 0;
        let mut queued = 0;
        for kind in EntityKind::ALL {
            let records = self.list(kind, owner_id, &ListFilter::default())?;
            for entity in &records {
                match self.save_to_remote_with_timestamp_check(entity).await {
                    Ok(PushOutcome::Upserted) => pushed += 1,
                    Ok(PushOutcome::ConflictSkipped) => conflicts += 1,
                    Err(err) => {
                        warn!(%kind, id = entity.id(), error = %err, "Push failed; queued");
                        self.note_error(&err);
                        self.queue.enqueue(entity, Utc::now())?;
                        queued += 1;
                    }
                }
            }
        }

        let drain = self.drain_queue().await?;
        info!(owner_id, pushed, conflicts, queued, "Full sync complete");
        Ok(SyncAllReport {
            owner_id: owner_id.to_string(),
            pushed,
            conflicts,
            queued,
            drain,
        })
    }

    // ==========
    // Status
    // ==========

    /// Current sync health.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be counted.
    pub fn status(&self) -> Result<SyncStatus> {
        let pending_count = self.queue.size()?;
        let state = self.state();
        Ok(SyncStatus {
            online: self.network.is_online(),
            syncing: self.queue.is_draining(),
            pending_count,
            last_attempt: state.last_attempt,
            last_error: state.last_error.clone(),
        })
    }

    /// Pending queue items in drain order.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue table cannot be read.
    pub fn queue_snapshot(&self) -> Result<Vec<QueueItem>> {
        self.queue.peek_all()
    }

    /// Discard every pending write. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn clear_queue(&self) -> Result<usize> {
        self.queue.clear()
    }

    // ==========
    // Internals
    // ==========

    async fn push_or_enqueue(&self, entity: &Entity) -> Result<SaveOutcome> {
        if !self.network.is_online() {
            self.queue.enqueue(entity, Utc::now())?;
            return Ok(SaveOutcome::Queued);
        }

        self.mark_attempt();
        let push = tokio::time::timeout(
            self.settings.remote_timeout,
            self.save_to_remote_with_timestamp_check(entity),
        );
        let err = match push.await {
            Ok(Ok(PushOutcome::Upserted)) => return Ok(SaveOutcome::Synced),
            Ok(Ok(PushOutcome::ConflictSkipped)) => return Ok(SaveOutcome::ConflictSkipped),
            Ok(Err(err)) => err,
            Err(_) => RemoteError::Timeout,
        };

        warn!(kind = %entity.kind(), id = entity.id(), error = %err, "Remote push failed; queued");
        self.note_error(&err);
        self.queue.enqueue(entity, Utc::now())?;
        Ok(SaveOutcome::Queued)
    }

    fn audit(&self, kind: EntityKind, id: &str, event_type: EventType, comment: &str) {
        let recorded = lock(&self.storage)
            .and_then(|mut s| s.record_sync_event(kind, id, event_type, comment, &self.settings.actor));
        if let Err(e) = recorded {
            warn!(%kind, id, event = event_type.as_str(), error = %e, "Failed to record sync event");
        }
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_attempt(&self) {
        self.state().last_attempt = Some(Utc::now());
    }

    fn note_error(&self, err: &RemoteError) {
        self.state().last_error = Some(err.to_string());
    }
}

impl<R: RemoteStore + 'static> SyncEngine<R> {
    /// Drain the queue whenever connectivity comes back.
    ///
    /// Also drains once at start if the monitor already reports online, so
    /// writes queued by a previous run go out without waiting for a flap.
    pub fn spawn_reconnect_listener(self: Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.network.watch();
        tokio::spawn(async move {
            let mut was_online = false;
            while rx.changed().await.is_ok() {
                let online = rx.borrow_and_update().is_online();
                if online && !was_online {
                    match self.drain_queue().await {
                        Ok(DrainResult::Completed(report)) => {
                            debug!(succeeded = report.succeeded, remaining = report.remaining, "Reconnect drain finished");
                        }
                        Ok(DrainResult::AlreadyRunning) => debug!("Reconnect drain skipped; already draining"),
                        Err(e) => error!(error = %e, "Reconnect drain failed"),
                    }
                }
                was_online = online;
            }
        })
    }
}

impl<R: RemoteStore> std::fmt::Debug for SyncEngine<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("remote", &self.remote.name())
            .field("network", &self.network.current())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DateRange, Feedback, FeedbackCategory, Location, Plan, Trip, User};
    use crate::network::Connectivity;
    use crate::remote::MemoryRemoteStore;
    use crate::storage::{shared, SqliteStorage};
    use crate::sync::retry::BackoffPolicy;
    use chrono::{Duration as ChronoDuration, NaiveDate};
    use std::collections::HashSet;
    use std::time::Duration;

    type Engine = SyncEngine<Arc<MemoryRemoteStore>>;

    fn settings() -> SyncSettings {
        SyncSettings {
            remote_timeout: Duration::from_secs(2),
            retry: BackoffPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
            },
            max_rejections: 2,
            actor: "test".to_string(),
        }
    }

    fn engine_with(remote: MemoryRemoteStore, online: bool) -> (Engine, Arc<MemoryRemoteStore>) {
        let remote = Arc::new(remote);
        let network = Arc::new(NetworkMonitor::new(Connectivity::from_online(online)));
        let storage = shared(SqliteStorage::open_memory().unwrap());
        let engine = SyncEngine::new(storage, Arc::clone(&remote), network, settings());
        (engine, remote)
    }

    fn engine(online: bool) -> (Engine, Arc<MemoryRemoteStore>) {
        engine_with(MemoryRemoteStore::new(), online)
    }

    fn trip(owner: &str, plan_id: &str) -> Trip {
        Trip::new(
            owner,
            plan_id,
            Location::new("Oaxaca", 17.07, -96.72),
            DateRange {
                start: NaiveDate::from_ymd_opt(2024, 11, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2024, 11, 4).unwrap(),
            },
        )
        .with_packing_list(&["hat", "sunscreen"])
        .with_mission("m1", "Try mole negro", 50)
    }

    fn plan_updated_at(plan: &Plan, offset: ChronoDuration) -> Plan {
        let mut newer = plan.clone();
        newer.updated_at = plan.updated_at + offset;
        newer
    }

    #[tokio::test]
    async fn test_offline_save_is_durable_and_queued() {
        let (engine, remote) = engine(false);
        let entity: Entity = trip("user_1", "plan_1").into();

        let outcome = engine.save(&entity).await.unwrap();

        assert_eq!(outcome, SaveOutcome::Queued);
        assert_eq!(engine.get(EntityKind::Trip, entity.id()).unwrap(), Some(entity.clone()));
        assert_eq!(remote.calls().total(), 0);
        let queued = engine.queue_snapshot().unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].entity, entity);
    }

    #[tokio::test]
    async fn test_save_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.db");
        let entity: Entity = Plan::new("user_1", "Weekend in Porto").into();

        {
            let network = Arc::new(NetworkMonitor::new(Connectivity::Offline));
            let storage = shared(SqliteStorage::open(&path).unwrap());
            let engine = SyncEngine::new(storage, MemoryRemoteStore::new(), network, settings());
            engine.save(&entity).await.unwrap();
        }

        let network = Arc::new(NetworkMonitor::new(Connectivity::Offline));
        let storage = shared(SqliteStorage::open(&path).unwrap());
        let engine = SyncEngine::new(storage, MemoryRemoteStore::new(), network, settings());
        assert_eq!(engine.get(EntityKind::Plan, entity.id()).unwrap(), Some(entity));
        assert_eq!(engine.status().unwrap().pending_count, 1);
    }

    #[tokio::test]
    async fn test_online_save_syncs() {
        let (engine, remote) = engine(true);
        let entity: Entity = User::new("Ada").into();

        assert_eq!(engine.save(&entity).await.unwrap(), SaveOutcome::Synced);
        assert_eq!(remote.get(EntityKind::User, entity.id()), Some(entity));
        assert_eq!(engine.status().unwrap().pending_count, 0);
    }

    #[tokio::test]
    async fn test_remote_newer_is_conflict_skipped() {
        let (engine, remote) = engine(true);
        let local = Plan::new("user_1", "Local title");
        let mut newer = plan_updated_at(&local, ChronoDuration::hours(1));
        newer.title = "Edited on another device".to_string();
        let newer: Entity = newer.into();
        remote.insert(&newer).unwrap();

        let local: Entity = local.into();
        let outcome = engine.save(&local).await.unwrap();

        assert_eq!(outcome, SaveOutcome::ConflictSkipped);
        assert_eq!(remote.get(EntityKind::Plan, local.id()), Some(newer));
        assert_eq!(remote.calls().upserts, 0);
        // Local keeps its own copy until an explicit pull.
        assert_eq!(engine.get(EntityKind::Plan, local.id()).unwrap(), Some(local.clone()));

        let events = lock(engine.storage())
            .unwrap()
            .get_events(EntityKind::Plan, local.id(), None)
            .unwrap();
        assert!(events.iter().any(|e| e.event_type == EventType::ConflictSkipped));
    }

    #[tokio::test]
    async fn test_equal_timestamps_write_through() {
        let (engine, remote) = engine(true);
        let plan: Entity = Plan::new("user_1", "Same instant").into();
        remote.insert(&plan).unwrap();

        let outcome = engine.save_to_remote_with_timestamp_check(&plan).await.unwrap();
        assert_eq!(outcome, PushOutcome::Upserted);
    }

    #[tokio::test]
    async fn test_push_is_idempotent() {
        let (engine, remote) = engine(true);
        let entity: Entity = trip("user_1", "plan_1").into();

        engine.save_to_remote_with_timestamp_check(&entity).await.unwrap();
        engine.save_to_remote_with_timestamp_check(&entity).await.unwrap();

        assert_eq!(remote.len(), 1);
        assert_eq!(remote.get(EntityKind::Trip, entity.id()), Some(entity));
    }

    #[tokio::test]
    async fn test_transient_failure_queues_without_failing_save() {
        let (engine, remote) = engine(true);
        remote.fail_next(1, &RemoteError::Unavailable("503".into()));
        let entity: Entity = User::new("Grace").into();

        assert_eq!(engine.save(&entity).await.unwrap(), SaveOutcome::Queued);
        let status = engine.status().unwrap();
        assert_eq!(status.pending_count, 1);
        assert!(status.last_error.unwrap().contains("503"));
        assert!(status.last_attempt.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_remote_times_out_into_queue() {
        let (engine, remote) =
            engine_with(MemoryRemoteStore::new().with_latency(Duration::from_secs(30)), true);
        let entity: Entity = User::new("Slow").into();

        assert_eq!(engine.save(&entity).await.unwrap(), SaveOutcome::Queued);
        assert_eq!(engine.status().unwrap().pending_count, 1);
        assert!(remote.is_empty());
    }

    #[tokio::test]
    async fn test_drain_attempts_each_item_once() {
        let (engine, remote) = engine(false);
        let a: Entity = User::new("a").into();
        let b: Entity = User::new("b").into();
        let c: Entity = User::new("c").into();
        for e in [&a, &b, &c] {
            engine.save(e).await.unwrap();
        }
        remote.reject_id(b.id());

        engine.network().report(Connectivity::Online);
        let report = *engine.drain_queue().await.unwrap().report().unwrap();

        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.retried, 1);
        assert_eq!(remote.calls().upserts, 3);
        assert_eq!(remote.upsert_log(), vec![a.id().to_string(), c.id().to_string()]);

        let left = engine.queue_snapshot().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].entity_id, b.id());
        assert_eq!(left[0].attempts, 1);
    }

    #[tokio::test]
    async fn test_transient_failures_are_never_dropped() {
        let (engine, remote) = engine(false);
        let entity: Entity = User::new("Patient").into();
        engine.save(&entity).await.unwrap();
        engine.network().report(Connectivity::Online);

        remote.set_reachable(false);
        for _ in 0..4 {
            engine.drain_queue().await.unwrap();
        }
        let left = engine.queue_snapshot().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].attempts, 4);

        remote.set_reachable(true);
        let report = *engine.drain_queue().await.unwrap().report().unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(engine.status().unwrap().last_error, None);
    }

    #[tokio::test]
    async fn test_rejected_write_dropped_after_max_rejections() {
        let (engine, remote) = engine(false);
        let entity: Entity = User::new("Invalid").into();
        engine.save(&entity).await.unwrap();
        remote.reject_id(entity.id());
        engine.network().report(Connectivity::Online);

        let first = *engine.drain_queue().await.unwrap().report().unwrap();
        assert_eq!(first.retried, 1);
        let second = *engine.drain_queue().await.unwrap().report().unwrap();
        assert_eq!(second.dropped, 1);
        assert_eq!(second.remaining, 0);

        let events = lock(engine.storage())
            .unwrap()
            .get_events(EntityKind::User, entity.id(), None)
            .unwrap();
        assert!(events.iter().any(|e| e.event_type == EventType::QueueDropped));
        // The local record itself is untouched.
        assert!(engine.get(EntityKind::User, entity.id()).unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_drains_upsert_at_most_once() {
        let (engine, remote) =
            engine_with(MemoryRemoteStore::new().with_latency(Duration::from_millis(50)), false);
        for name in ["a", "b", "c"] {
            engine.save(&User::new(name).into()).await.unwrap();
        }
        engine.network().report(Connectivity::Online);

        let (first, second) = tokio::join!(engine.drain_queue(), engine.drain_queue());
        let results = [first.unwrap(), second.unwrap()];

        assert_eq!(
            results.iter().filter(|r| **r == DrainResult::AlreadyRunning).count(),
            1
        );
        let log = remote.upsert_log();
        let unique: HashSet<_> = log.iter().collect();
        assert_eq!(log.len(), 3);
        assert_eq!(unique.len(), 3);
    }

    #[tokio::test]
    async fn test_offline_trip_reaches_remote_after_reconnect() {
        let (engine, remote) = engine(false);
        let engine = Arc::new(engine);
        let listener = Arc::clone(&engine).spawn_reconnect_listener();

        let entity: Entity = trip("user_1", "plan_1").into();
        assert_eq!(engine.save(&entity).await.unwrap(), SaveOutcome::Queued);
        assert_eq!(engine.status().unwrap().pending_count, 1);

        engine.network().report(Connectivity::Online);
        tokio::time::timeout(Duration::from_secs(5), async {
            while engine.status().unwrap().pending_count > 0 || engine.status().unwrap().syncing {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(remote.get(EntityKind::Trip, entity.id()), Some(entity));
        listener.abort();
    }

    #[tokio::test]
    async fn test_pull_creates_remote_only_records() {
        let (engine, remote) = engine(true);
        let plan: Entity = Plan::new("user_1", "Remote only").into();
        let other: Entity = Plan::new("user_2", "Someone else").into();
        remote.insert(&plan).unwrap();
        remote.insert(&other).unwrap();

        let report = engine.pull("user_1").await.unwrap();

        assert_eq!(report.plans.created, 1);
        assert_eq!(report.total_applied(), 1);
        assert_eq!(engine.get(EntityKind::Plan, plan.id()).unwrap(), Some(plan));
        assert_eq!(engine.get(EntityKind::Plan, other.id()).unwrap(), None);
        assert_eq!(remote.calls().queries, EntityKind::ALL.len());
    }

    #[tokio::test]
    async fn test_pull_keeps_newer_local_and_takes_newer_remote() {
        let (engine, remote) = engine(false);
        let stale_remote = Plan::new("user_1", "Stale remote");
        let local_newer = plan_updated_at(&stale_remote, ChronoDuration::minutes(5));
        engine.save(&local_newer.clone().into()).await.unwrap();
        remote.insert(&stale_remote.into()).unwrap();

        let old_local = Plan::new("user_1", "Old local");
        engine.save(&old_local.clone().into()).await.unwrap();
        let mut fresh_remote = plan_updated_at(&old_local, ChronoDuration::minutes(5));
        fresh_remote.title = "Fresh remote".to_string();
        remote.insert(&fresh_remote.clone().into()).unwrap();

        engine.network().report(Connectivity::Online);
        let report = engine.pull("user_1").await.unwrap();

        assert_eq!(report.plans.updated, 1);
        assert_eq!(report.plans.skipped, 1);
        assert_eq!(
            engine.get(EntityKind::Plan, &local_newer.id).unwrap(),
            Some(local_newer.into())
        );
        assert_eq!(
            engine.get(EntityKind::Plan, &fresh_remote.id).unwrap(),
            Some(fresh_remote.into())
        );
    }

    #[tokio::test]
    async fn test_pull_retries_transient_failures() {
        let (engine, remote) = engine(true);
        let user: Entity = User::new("Retry").into();
        remote.insert(&user).unwrap();
        remote.fail_next(2, &RemoteError::Timeout);

        let report = engine.pull(user.owner_id()).await.unwrap();
        assert_eq!(report.users.created, 1);
        assert_eq!(remote.calls().queries, EntityKind::ALL.len() + 2);
    }

    #[tokio::test]
    async fn test_pull_propagates_persistent_failure() {
        let (engine, remote) = engine(true);
        remote.set_reachable(false);

        let err = engine.pull("user_1").await.unwrap_err();
        assert!(matches!(err, Error::Remote(RemoteError::Unavailable(_))));
        assert_eq!(remote.calls().queries, 3);
    }

    #[tokio::test]
    async fn test_pull_does_not_retry_rejected_query() {
        let (engine, remote) = engine(true);
        remote.fail_next(
            1,
            &RemoteError::Rejected {
                status: 400,
                message: "bad filter".to_string(),
            },
        );

        let err = engine.pull("user_1").await.unwrap_err();
        assert!(matches!(err, Error::Remote(RemoteError::Rejected { status: 400, .. })));
        assert_eq!(remote.calls().queries, 1);
    }

    #[tokio::test]
    async fn test_pull_skips_invalid_records_and_continues() {
        let (engine, remote) = engine(true);
        let good = Plan::new("user_1", "Good");
        let mut backwards = Plan::new("user_1", "Backwards");
        backwards.updated_at = backwards.created_at - ChronoDuration::hours(1);
        remote.insert(&good.clone().into()).unwrap();
        remote.insert(&backwards.clone().into()).unwrap();
        remote.insert_row(
            EntityKind::Plan,
            "plan_broken",
            serde_json::json!({"id": "plan_broken", "owner_id": "user_1"}),
        );
        let feedback: Entity = Feedback::new("user_1", FeedbackCategory::Bug, "Crash").into();
        remote.insert(&feedback).unwrap();

        let report = engine.pull("user_1").await.unwrap();

        assert_eq!(report.plans.created, 1);
        assert_eq!(report.plans.rejected, 1);
        assert_eq!(report.feedback.created, 1);
        assert_eq!(engine.get(EntityKind::Plan, &good.id).unwrap(), Some(good.into()));
        assert_eq!(engine.get(EntityKind::Plan, &backwards.id).unwrap(), None);
        assert_eq!(engine.get(EntityKind::Feedback, feedback.id()).unwrap(), Some(feedback));
    }

    #[tokio::test]
    async fn test_explicit_sync_requires_connectivity() {
        let (engine, remote) = engine(false);

        assert!(matches!(engine.pull("user_1").await, Err(Error::Offline(_))));
        assert!(matches!(engine.manual_sync().await, Err(Error::Offline(_))));
        assert!(matches!(engine.sync_all("user_1").await, Err(Error::Offline(_))));
        assert_eq!(remote.calls().total(), 0);
    }

    #[tokio::test]
    async fn test_sync_all_pushes_owner_records() {
        let (engine, remote) = engine(false);
        let user = User::new("Owner");
        let plan = Plan::new(&user.id, "Plan");
        let trip = trip(&user.id, &plan.id);
        let foreign = Plan::new("user_other", "Not mine");
        for e in [
            Entity::from(user.clone()),
            plan.clone().into(),
            trip.clone().into(),
            foreign.clone().into(),
        ] {
            engine.save(&e).await.unwrap();
        }
        engine.clear_queue().unwrap();
        engine.network().report(Connectivity::Online);

        let report = engine.sync_all(&user.id).await.unwrap();

        assert_eq!(report.pushed, 3);
        assert_eq!(report.queued, 0);
        assert_eq!(report.drain.report().unwrap().attempted, 0);
        assert_eq!(remote.len(), 3);
        assert!(remote.get(EntityKind::Plan, &foreign.id).is_none());
    }

    #[tokio::test]
    async fn test_update_field_offline_queues_updated_record() {
        let (engine, _remote) = engine(false);
        let trip = trip("user_1", "plan_1");
        let before = trip.updated_at;
        engine.save(&trip.clone().into()).await.unwrap();
        engine.clear_queue().unwrap();

        let outcome = engine
            .update_field(&trip.id, &FieldUpdate::Bookmarked { value: true })
            .await
            .unwrap();
        assert_eq!(outcome, SaveOutcome::Queued);

        let queued = engine.queue_snapshot().unwrap();
        assert_eq!(queued.len(), 1);
        let Entity::Trip(updated) = &queued[0].entity else {
            panic!("expected a trip");
        };
        assert!(updated.bookmarked);
        assert!(updated.updated_at >= before);
    }

    #[tokio::test]
    async fn test_update_field_online_syncs() {
        let (engine, remote) = engine(true);
        let trip = trip("user_1", "plan_1");
        engine.save(&trip.clone().into()).await.unwrap();

        let outcome = engine
            .update_field(
                &trip.id,
                &FieldUpdate::PackingItemChecked {
                    index: 1,
                    checked: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome, SaveOutcome::Synced);
        let Some(Entity::Trip(remote_trip)) = remote.get(EntityKind::Trip, &trip.id) else {
            panic!("expected remote trip");
        };
        assert!(remote_trip.packing_list[1].checked);

        let err = engine
            .update_field("trip_missing", &FieldUpdate::Bookmarked { value: true })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_is_best_effort_and_not_queued() {
        let (engine, remote) = engine(true);
        let user: Entity = User::new("Gone").into();
        engine.save(&user).await.unwrap();

        remote.fail_next(1, &RemoteError::Unavailable("flaky".into()));
        assert!(engine.delete(EntityKind::User, user.id()).await.unwrap());
        assert_eq!(engine.get(EntityKind::User, user.id()).unwrap(), None);
        assert_eq!(engine.status().unwrap().pending_count, 0);
        // The failed remote delete is not retried.
        assert!(remote.get(EntityKind::User, user.id()).is_some());

        assert!(!engine.delete(EntityKind::User, user.id()).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_plan_cascade() {
        let (engine, remote) = engine(true);
        let plan = Plan::new("user_1", "Cascade");
        let t1 = trip("user_1", &plan.id);
        let t2 = trip("user_1", &plan.id);
        let unrelated = trip("user_1", "plan_other");
        for e in [
            Entity::from(plan.clone()),
            t1.clone().into(),
            t2.clone().into(),
            unrelated.clone().into(),
        ] {
            engine.save(&e).await.unwrap();
        }

        assert_eq!(engine.delete_plan_cascade(&plan.id).await.unwrap(), 2);
        assert_eq!(engine.get(EntityKind::Plan, &plan.id).unwrap(), None);
        assert_eq!(engine.get(EntityKind::Trip, &t1.id).unwrap(), None);
        assert!(engine.get(EntityKind::Trip, &unrelated.id).unwrap().is_some());
        assert_eq!(remote.len(), 1);

        let err = engine.delete_plan_cascade(&plan.id).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
