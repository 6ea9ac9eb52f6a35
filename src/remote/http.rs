//! HTTP remote store.
//!
//! Talks to a PostgREST-style REST surface (`{base}/rest/v1/{table}`), the
//! shape exposed by hosted Postgres backends. Every request carries the
//! configured timeout so a hung server can't stall a save.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use super::rows::{decode_rows, to_remote_row};
use super::{RemoteError, RemoteStore};
use crate::model::{Entity, EntityKind};

/// Remote store backed by a PostgREST-compatible HTTP API.
pub struct HttpRemoteStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpRemoteStore {
    /// Create a store for `base_url` (without the `/rest/v1` suffix).
    #[must_use]
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout,
        }
    }

    fn table_url(&self, kind: EntityKind) -> String {
        format!("{}/rest/v1/{}", self.base_url, kind.table())
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url).timeout(self.timeout);
        match &self.api_key {
            Some(key) => builder.header("apikey", key).bearer_auth(key),
            None => builder,
        }
    }
}

/// Projection returned by the `select=updated_at` query.
#[derive(Debug, Deserialize)]
struct UpdatedAtRow {
    updated_at: DateTime<Utc>,
}

fn send_error(err: &reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Unavailable(err.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::from_status(status.as_u16(), &body))
}

fn decode_error(err: &reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Rejected {
            status: 0,
            message: format!("failed to parse response: {err}"),
        }
    }
}

impl RemoteStore for HttpRemoteStore {
    fn name(&self) -> &str {
        "http"
    }

    async fn upsert(&self, entity: &Entity) -> Result<(), RemoteError> {
        let row = to_remote_row(entity)?;
        debug!(kind = %entity.kind(), id = entity.id(), "POST upsert");

        let response = self
            .request(reqwest::Method::POST, &self.table_url(entity.kind()))
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&[row])
            .send()
            .await
            .map_err(|e| send_error(&e))?;

        check_status(response).await?;
        Ok(())
    }

    async fn fetch_updated_at(
        &self,
        kind: EntityKind,
        id: &str,
    ) -> Result<Option<DateTime<Utc>>, RemoteError> {
        let response = self
            .request(reqwest::Method::GET, &self.table_url(kind))
            .query(&[("id", format!("eq.{id}")), ("select", "updated_at".to_string())])
            .send()
            .await
            .map_err(|e| send_error(&e))?;

        let rows: Vec<UpdatedAtRow> = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| decode_error(&e))?;

        Ok(rows.into_iter().next().map(|row| row.updated_at))
    }

    async fn query_by_owner(
        &self,
        kind: EntityKind,
        owner_id: &str,
    ) -> Result<Vec<Entity>, RemoteError> {
        let response = self
            .request(reqwest::Method::GET, &self.table_url(kind))
            .query(&[("owner_id", format!("eq.{owner_id}")), ("select", "*".to_string())])
            .send()
            .await
            .map_err(|e| send_error(&e))?;

        let rows: Vec<serde_json::Value> = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| decode_error(&e))?;

        debug!(kind = %kind, owner_id, rows = rows.len(), "Fetched remote rows");
        Ok(decode_rows(kind, rows))
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<(), RemoteError> {
        let response = self
            .request(reqwest::Method::DELETE, &self.table_url(kind))
            .query(&[("id", format!("eq.{id}"))])
            .send()
            .await
            .map_err(|e| send_error(&e))?;

        check_status(response).await?;
        Ok(())
    }

    async fn ping(&self) -> bool {
        let url = format!("{}/rest/v1/", self.base_url);
        match self.request(reqwest::Method::GET, &url).send().await {
            Ok(response) => !response.status().is_server_error(),
            Err(e) => {
                debug!(error = %e, "Remote ping failed");
                false
            }
        }
    }
}

impl std::fmt::Debug for HttpRemoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRemoteStore")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_url_trims_trailing_slash() {
        let store = HttpRemoteStore::new("https://example.supabase.co/", None, Duration::from_secs(5));
        assert_eq!(
            store.table_url(EntityKind::Feedback),
            "https://example.supabase.co/rest/v1/feedback"
        );
    }

    #[test]
    fn test_debug_redacts_key() {
        let store = HttpRemoteStore::new(
            "https://example.supabase.co",
            Some("secret-key".into()),
            Duration::from_secs(5),
        );
        let debug = format!("{store:?}");
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("<redacted>"));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transient() {
        // Port 9 (discard) on localhost is not expected to run an HTTP server.
        let store = HttpRemoteStore::new("http://127.0.0.1:9", None, Duration::from_millis(500));
        let err = store
            .fetch_updated_at(EntityKind::Trip, "trip_1")
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(!store.ping().await);
    }
}
