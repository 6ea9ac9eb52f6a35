//! Outcome, report and settings types for the sync engine.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::retry::BackoffPolicy;
use crate::model::EntityKind;
use crate::queue::DrainResult;
use crate::storage::MergeOutcome;

/// What happened to the remote copy during a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveOutcome {
    /// The remote now holds this version.
    Synced,
    /// The remote holds a newer version; it was left alone.
    ConflictSkipped,
    /// Offline, failed or too slow; the write waits in the queue.
    Queued,
}

impl SaveOutcome {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::ConflictSkipped => "conflict_skipped",
            Self::Queued => "queued",
        }
    }
}

/// Result of one timestamp-checked push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PushOutcome {
    Upserted,
    ConflictSkipped,
}

/// Per-kind counts for a pull.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntityStats {
    /// Records that did not exist locally.
    pub created: usize,
    /// Local records replaced by a strictly newer remote copy.
    pub updated: usize,
    /// Remote records that were not newer than the local copy.
    pub skipped: usize,
    /// Remote records that failed validation or belong to another owner.
    pub rejected: usize,
}

impl EntityStats {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.created + self.updated + self.skipped + self.rejected
    }

    pub fn record(&mut self, outcome: MergeOutcome) {
        match outcome {
            MergeOutcome::Created => self.created += 1,
            MergeOutcome::Updated => self.updated += 1,
            MergeOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Statistics for a pull.
#[derive(Debug, Default, Clone, Serialize)]
pub struct PullReport {
    pub owner_id: String,
    pub users: EntityStats,
    pub plans: EntityStats,
    pub trips: EntityStats,
    pub feedback: EntityStats,
}

impl PullReport {
    #[must_use]
    pub fn new(owner_id: &str) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn stats(&self, kind: EntityKind) -> &EntityStats {
        match kind {
            EntityKind::User => &self.users,
            EntityKind::Plan => &self.plans,
            EntityKind::Trip => &self.trips,
            EntityKind::Feedback => &self.feedback,
        }
    }

    pub fn stats_mut(&mut self, kind: EntityKind) -> &mut EntityStats {
        match kind {
            EntityKind::User => &mut self.users,
            EntityKind::Plan => &mut self.plans,
            EntityKind::Trip => &mut self.trips,
            EntityKind::Feedback => &mut self.feedback,
        }
    }

    /// Total number of remote records seen.
    #[must_use]
    pub fn total_processed(&self) -> usize {
        EntityKind::ALL.iter().map(|k| self.stats(*k).total()).sum()
    }

    /// Records written locally (created or updated).
    #[must_use]
    pub fn total_applied(&self) -> usize {
        EntityKind::ALL
            .iter()
            .map(|k| self.stats(*k).created + self.stats(*k).updated)
            .sum()
    }

    /// Remote records left out of the local store.
    #[must_use]
    pub fn total_rejected(&self) -> usize {
        EntityKind::ALL.iter().map(|k| self.stats(*k).rejected).sum()
    }
}

/// Statistics for a full push of one owner's records.
#[derive(Debug, Clone, Serialize)]
pub struct SyncAllReport {
    pub owner_id: String,
    /// Records upserted directly.
    pub pushed: usize,
    /// Records skipped because the remote was newer.
    pub conflicts: usize,
    /// Records whose push failed and were queued.
    pub queued: usize,
    /// The queue drain that closed the run.
    pub drain: DrainResult,
}

/// Snapshot of sync health.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub online: bool,
    /// Whether a queue drain is running right now.
    pub syncing: bool,
    pub pending_count: usize,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Resolved engine settings.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Upper bound on the remote leg of a save.
    pub remote_timeout: Duration,
    /// Retry policy for `pull`.
    pub retry: BackoffPolicy,
    /// Rejected attempts tolerated before a queued write is dropped.
    pub max_rejections: u32,
    /// Actor recorded on audit events.
    pub actor: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            remote_timeout: Duration::from_millis(5000),
            retry: BackoffPolicy::default(),
            max_rejections: 5,
            actor: "unknown".to_string(),
        }
    }
}
