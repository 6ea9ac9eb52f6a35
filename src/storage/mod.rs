//! SQLite storage layer for tripsync.
//!
//! This module provides the local store using SQLite with:
//! - WAL mode for concurrent reads
//! - Transaction discipline for atomic writes
//! - The persisted sync queue
//! - Audit events for history
//!
//! # Submodules
//!
//! - [`events`] - Audit event storage
//! - [`migrations`] - Embedded schema migrations
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - Main SQLite storage implementation

pub mod events;
pub mod migrations;
pub mod schema;
pub mod sqlite;

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Error, Result};

pub use sqlite::{
    format_timestamp, ListFilter, ListOrder, MergeOutcome, MutationContext, QueueItem, SaveKind,
    SqliteStorage,
};

/// Storage handle shared by the queue and the engine.
///
/// Guards are short-lived and never held across an `.await`.
pub type SharedStorage = Arc<Mutex<SqliteStorage>>;

/// Wrap a storage value for sharing.
#[must_use]
pub fn shared(storage: SqliteStorage) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}

/// Lock the shared storage, surfacing a poisoned mutex as an error.
///
/// # Errors
///
/// Returns `Error::Other` if a previous holder panicked.
pub fn lock(storage: &SharedStorage) -> Result<MutexGuard<'_, SqliteStorage>> {
    storage
        .lock()
        .map_err(|_| Error::Other("storage lock poisoned".to_string()))
}
