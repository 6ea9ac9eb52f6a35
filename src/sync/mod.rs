//! Sync orchestration.
//!
//! This module ties the local store, the queue, the remote and the network
//! monitor together:
//!
//! - **Save**: local write first, then a timestamp-checked push raced against
//!   a timeout; anything that doesn't make it is queued
//! - **Drain**: queued writes are pushed in order on reconnect or on demand
//! - **Pull**: remote records newer than the local copy are applied locally
//! - **Status**: connectivity, queue depth and the last failure
//!
//! # Conflict resolution
//!
//! Whole-record last-write-wins on `updated_at`. A push never overwrites a
//! strictly newer remote copy, and a pull never overwrites a local copy that
//! is as new or newer.
//!
//! # Example
//!
//! ```ignore
//! use tripsync::sync::{SyncEngine, SyncSettings};
//!
//! let engine = Arc::new(SyncEngine::new(storage, remote, network, SyncSettings::default()));
//! let listener = Arc::clone(&engine).spawn_reconnect_listener();
//!
//! let outcome = engine.save(&trip.into()).await?;   // Synced, ConflictSkipped or Queued
//! let report = engine.pull("user_123").await?;
//! ```

mod engine;
mod retry;
mod status;
mod types;

pub use engine::SyncEngine;
pub use retry::{retry_with_backoff, retry_with_backoff_while, BackoffPolicy};
pub use status::print_status;
pub use types::{
    EntityStats, PullReport, PushOutcome, SaveOutcome, SyncAllReport, SyncSettings, SyncStatus,
};
