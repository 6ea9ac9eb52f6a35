//! Remote store adapter.
//!
//! Defines the interface to the authoritative remote store. The engine only
//! needs four record operations plus a reachability probe:
//!
//! - [`http`] - PostgREST-style HTTP implementation (reqwest)
//! - [`memory`] - in-process implementation with failure injection
//! - [`rows`] - entity to remote row mapping

pub mod http;
pub mod memory;
pub mod rows;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{Entity, EntityKind};

pub use http::HttpRemoteStore;
pub use memory::{CallCounts, MemoryRemoteStore};
pub use rows::{decode_rows, from_remote_row, to_remote_row};

/// Failure of a remote call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Connection refused, DNS failure, 5xx, 408 or 429.
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("request timed out")]
    Timeout,

    /// The remote refused the request. Retrying the same payload will not help.
    /// `status` is 0 when the response itself could not be decoded.
    #[error("rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
}

impl RemoteError {
    /// Classify an unsuccessful HTTP status.
    #[must_use]
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            408 | 429 | 500..=599 => Self::Unavailable(format!("HTTP {status}: {body}")),
            _ => Self::Rejected {
                status,
                message: body.to_string(),
            },
        }
    }

    /// Whether the same call may succeed later.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }
}

/// Trait for remote stores.
///
/// Implemented by the HTTP and in-memory stores. Upserts must be idempotent:
/// writing the same record twice leaves the same remote state.
pub trait RemoteStore: Send + Sync {
    /// Short name for logs and status output.
    fn name(&self) -> &str;

    /// Insert or replace a record by id.
    fn upsert(&self, entity: &Entity) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// The remote `updated_at` of a record, or `None` if it doesn't exist.
    fn fetch_updated_at(
        &self,
        kind: EntityKind,
        id: &str,
    ) -> impl Future<Output = Result<Option<DateTime<Utc>>, RemoteError>> + Send;

    /// All records of one kind owned by `owner_id`.
    fn query_by_owner(
        &self,
        kind: EntityKind,
        owner_id: &str,
    ) -> impl Future<Output = Result<Vec<Entity>, RemoteError>> + Send;

    /// Delete a record. Deleting a missing record is not an error.
    fn delete(
        &self,
        kind: EntityKind,
        id: &str,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Whether the remote answers at all.
    fn ping(&self) -> impl Future<Output = bool> + Send;
}

impl<R: RemoteStore> RemoteStore for Arc<R> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn upsert(&self, entity: &Entity) -> impl Future<Output = Result<(), RemoteError>> + Send {
        (**self).upsert(entity)
    }

    fn fetch_updated_at(
        &self,
        kind: EntityKind,
        id: &str,
    ) -> impl Future<Output = Result<Option<DateTime<Utc>>, RemoteError>> + Send {
        (**self).fetch_updated_at(kind, id)
    }

    fn query_by_owner(
        &self,
        kind: EntityKind,
        owner_id: &str,
    ) -> impl Future<Output = Result<Vec<Entity>, RemoteError>> + Send {
        (**self).query_by_owner(kind, owner_id)
    }

    fn delete(
        &self,
        kind: EntityKind,
        id: &str,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send {
        (**self).delete(kind, id)
    }

    fn ping(&self) -> impl Future<Output = bool> + Send {
        (**self).ping()
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Boxed remote store for runtime selection.
///
/// Since the trait has async methods with `impl Future`, this wrapper
/// provides runtime polymorphism (the CLI picks HTTP or memory at startup).
pub struct BoxedRemote {
    inner: Box<dyn RemoteStoreBoxed>,
}

/// Object-safe version of [`RemoteStore`] for boxing.
trait RemoteStoreBoxed: Send + Sync {
    fn name(&self) -> &str;
    fn upsert_boxed<'a>(&'a self, entity: &'a Entity) -> BoxFuture<'a, Result<(), RemoteError>>;
    fn fetch_updated_at_boxed<'a>(
        &'a self,
        kind: EntityKind,
        id: &'a str,
    ) -> BoxFuture<'a, Result<Option<DateTime<Utc>>, RemoteError>>;
    fn query_by_owner_boxed<'a>(
        &'a self,
        kind: EntityKind,
        owner_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Entity>, RemoteError>>;
    fn delete_boxed<'a>(
        &'a self,
        kind: EntityKind,
        id: &'a str,
    ) -> BoxFuture<'a, Result<(), RemoteError>>;
    fn ping_boxed(&self) -> BoxFuture<'_, bool>;
}

/// Wrapper to implement `RemoteStoreBoxed` for any `RemoteStore`.
struct BoxedRemoteWrapper<R: RemoteStore + 'static>(R);

impl<R: RemoteStore + 'static> RemoteStoreBoxed for BoxedRemoteWrapper<R> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn upsert_boxed<'a>(&'a self, entity: &'a Entity) -> BoxFuture<'a, Result<(), RemoteError>> {
        Box::pin(self.0.upsert(entity))
    }

    fn fetch_updated_at_boxed<'a>(
        &'a self,
        kind: EntityKind,
        id: &'a str,
    ) -> BoxFuture<'a, Result<Option<DateTime<Utc>>, RemoteError>> {
        Box::pin(self.0.fetch_updated_at(kind, id))
    }

    fn query_by_owner_boxed<'a>(
        &'a self,
        kind: EntityKind,
        owner_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Entity>, RemoteError>> {
        Box::pin(self.0.query_by_owner(kind, owner_id))
    }

    fn delete_boxed<'a>(
        &'a self,
        kind: EntityKind,
        id: &'a str,
    ) -> BoxFuture<'a, Result<(), RemoteError>> {
        Box::pin(self.0.delete(kind, id))
    }

    fn ping_boxed(&self) -> BoxFuture<'_, bool> {
        Box::pin(self.0.ping())
    }
}

impl BoxedRemote {
    /// Create a new boxed remote store.
    pub fn new<R: RemoteStore + 'static>(remote: R) -> Self {
        Self {
            inner: Box::new(BoxedRemoteWrapper(remote)),
        }
    }
}

impl RemoteStore for BoxedRemote {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn upsert(&self, entity: &Entity) -> impl Future<Output = Result<(), RemoteError>> + Send {
        async move { self.inner.upsert_boxed(entity).await }
    }

    fn fetch_updated_at(
        &self,
        kind: EntityKind,
        id: &str,
    ) -> impl Future<Output = Result<Option<DateTime<Utc>>, RemoteError>> + Send {
        async move { self.inner.fetch_updated_at_boxed(kind, id).await }
    }

    fn query_by_owner(
        &self,
        kind: EntityKind,
        owner_id: &str,
    ) -> impl Future<Output = Result<Vec<Entity>, RemoteError>> + Send {
        async move { self.inner.query_by_owner_boxed(kind, owner_id).await }
    }

    fn delete(
        &self,
        kind: EntityKind,
        id: &str,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send {
        async move { self.inner.delete_boxed(kind, id).await }
    }

    fn ping(&self) -> impl Future<Output = bool> + Send {
        self.inner.ping_boxed()
    }
}
