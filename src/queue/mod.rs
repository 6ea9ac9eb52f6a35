//! Persisted sync queue.
//!
//! Pending remote writes live in the `sync_queue` table of the local
//! database, so they survive restarts. Items are drained in enqueue order by
//! at most one drain at a time; overlapping drain requests return
//! [`DrainResult::AlreadyRunning`] without touching any item.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::model::Entity;
use crate::storage::{lock, SharedStorage};

pub use crate::storage::QueueItem;

/// What the drain handler decided for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Delivered (or superseded); remove the item.
    Done,
    /// Keep the item and count the failed attempt.
    Retry(String),
    /// Give up on the item and remove it.
    Drop(String),
}

/// Counts from one completed drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub retried: usize,
    pub dropped: usize,
    /// Items left in the queue afterwards, including any enqueued mid-drain.
    pub remaining: usize,
}

/// Result of a drain request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DrainResult {
    Completed(DrainReport),
    /// Another drain was in progress; nothing was done.
    AlreadyRunning,
}

impl DrainResult {
    #[must_use]
    pub const fn report(&self) -> Option<&DrainReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::AlreadyRunning => None,
        }
    }
}

/// Resets the draining flag however the drain exits.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Ordered, persisted backlog of pending remote writes.
#[derive(Debug)]
pub struct SyncQueue {
    storage: SharedStorage,
    draining: AtomicBool,
}

impl SyncQueue {
    #[must_use]
    pub fn new(storage: SharedStorage) -> Self {
        Self {
            storage,
            draining: AtomicBool::new(false),
        }
    }

    /// Append a full record. It is persisted before this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn enqueue(&self, entity: &Entity, enqueued_at: DateTime<Utc>) -> Result<QueueItem> {
        let item = lock(&self.storage)?.queue_push(entity, enqueued_at)?;
        info!(kind = %item.kind, id = %item.entity_id, seq = item.seq, "Queued for sync");
        Ok(item)
    }

    /// Process every item queued at the time of the call, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue table cannot be read or updated. Items
    /// already processed keep their new state.
    pub async fn drain<F, Fut>(&self, mut handler: F) -> Result<DrainResult>
    where
        F: FnMut(QueueItem) -> Fut,
        Fut: Future<Output = ItemOutcome>,
    {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Drain already running");
            return Ok(DrainResult::AlreadyRunning);
        }
        let _guard = DrainGuard(&self.draining);

        let items = lock(&self.storage)?.queue_items()?;
        let mut report = DrainReport {
            attempted: items.len(),
            ..DrainReport::default()
        };
        if !items.is_empty() {
            info!(items = items.len(), "Draining sync queue");
        }

        for item in items {
            let seq = item.seq;
            let kind = item.kind;
            let id = item.entity_id.clone();
            let attempts = item.attempts;

            let outcome = handler(item).await;

            match outcome {
                ItemOutcome::Done => {
                    lock(&self.storage)?.queue_remove(seq)?;
                    report.succeeded += 1;
                    debug!(%kind, %id, seq, "Dequeued");
                }
                ItemOutcome::Retry(reason) => {
                    lock(&self.storage)?.queue_record_attempt(seq, &reason, Utc::now())?;
                    report.retried += 1;
                    debug!(%kind, %id, seq, attempts = attempts + 1, error = %reason, "Kept for retry");
                }
                ItemOutcome::Drop(reason) => {
                    lock(&self.storage)?.queue_remove(seq)?;
                    report.dropped += 1;
                    warn!(%kind, %id, seq, attempts = attempts + 1, error = %reason, "Dropped from sync queue");
                }
            }
        }

        report.remaining = self.size()?;
        info!(
            succeeded = report.succeeded,
            retried = report.retried,
            dropped = report.dropped,
            remaining = report.remaining,
            "Drain complete"
        );
        Ok(DrainResult::Completed(report))
    }

    /// Number of pending items.
    ///
    /// # Errors
    ///
    /// Returns an error if the count query fails.
    pub fn size(&self) -> Result<usize> {
        lock(&self.storage)?.queue_len()
    }

    /// Snapshot of pending items in drain order.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue table cannot be read.
    pub fn peek_all(&self) -> Result<Vec<QueueItem>> {
        lock(&self.storage)?.queue_items()
    }

    /// Discard every pending item, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn clear(&self) -> Result<usize> {
        let removed = lock(&self.storage)?.queue_clear()?;
        warn!(removed, "Sync queue cleared");
        Ok(removed)
    }

    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::User;
    use crate::storage::{shared, SqliteStorage};
    use std::sync::Arc;

    fn queue() -> SyncQueue {
        SyncQueue::new(shared(SqliteStorage::open_memory().unwrap()))
    }

    fn user(name: &str) -> Entity {
        User::new(name).into()
    }

    #[tokio::test]
    async fn test_drain_in_order_with_outcomes() {
        let queue = queue();
        let a = queue.enqueue(&user("a"), Utc::now()).unwrap();
        let b = queue.enqueue(&user("b"), Utc::now()).unwrap();
        let c = queue.enqueue(&user("c"), Utc::now()).unwrap();

        let mut seen = Vec::new();
        let result = queue
            .drain(|item| {
                seen.push(item.seq);
                let outcome = if item.seq == a.seq {
                    ItemOutcome::Done
                } else if item.seq == b.seq {
                    ItemOutcome::Retry("timeout".into())
                } else {
                    ItemOutcome::Drop("rejected".into())
                };
                async move { outcome }
            })
            .await
            .unwrap();

        assert_eq!(seen, vec![a.seq, b.seq, c.seq]);
        let report = result.report().copied().unwrap();
        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.retried, 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.remaining, 1);

        let left = queue.peek_all().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].seq, b.seq);
        assert_eq!(left[0].attempts, 1);
        assert_eq!(left[0].last_error.as_deref(), Some("timeout"));
        assert!(!queue.is_draining());
    }

    #[tokio::test]
    async fn test_concurrent_drain_is_rejected() {
        let queue = Arc::new(queue());
        queue.enqueue(&user("a"), Utc::now()).unwrap();

        let (entered_tx, entered_rx) = tokio::sync::oneshot::channel::<()>();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let mut entered_tx = Some(entered_tx);
        let mut release_rx = Some(release_rx);

        let first = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                queue
                    .drain(move |_item| {
                        let entered = entered_tx.take();
                        let release = release_rx.take();
                        async move {
                            if let Some(tx) = entered {
                                let _ = tx.send(());
                            }
                            if let Some(rx) = release {
                                let _ = rx.await;
                            }
                            ItemOutcome::Done
                        }
                    })
                    .await
            })
        };

        entered_rx.await.unwrap();
        assert!(queue.is_draining());
        let second = queue
            .drain(|_item| async { ItemOutcome::Done })
            .await
            .unwrap();
        assert_eq!(second, DrainResult::AlreadyRunning);
        assert_eq!(queue.size().unwrap(), 1);

        release_tx.send(()).unwrap();
        let first = first.await.unwrap().unwrap();
        assert_eq!(first.report().unwrap().succeeded, 1);
        assert!(!queue.is_draining());
    }

    #[tokio::test]
    async fn test_queue_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");
        let entity = user("persisted");

        {
            let queue = SyncQueue::new(shared(SqliteStorage::open(&path).unwrap()));
            queue.enqueue(&entity, Utc::now()).unwrap();
        }

        let queue = SyncQueue::new(shared(SqliteStorage::open(&path).unwrap()));
        let items = queue.peek_all().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].entity, entity);
        assert_eq!(queue.clear().unwrap(), 1);
        assert_eq!(queue.size().unwrap(), 0);
    }
}
