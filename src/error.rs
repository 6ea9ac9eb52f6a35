//! Error types for tripsync.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=not_found, 4=validation, etc.)
//! - Retryability flags
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

use crate::model::EntityKind;
use crate::remote::RemoteError;

/// Result type alias for tripsync operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Scripts match on the string or the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    NotInitialized,
    AlreadyInitialized,
    DatabaseError,

    // Not Found (exit 3)
    NotFound,

    // Validation (exit 4)
    InvalidArgument,

    // Sync (exit 6)
    Offline,
    RemoteTransient,
    RemoteRejected,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::Offline => "OFFLINE",
            Self::RemoteTransient => "REMOTE_TRANSIENT",
            Self::RemoteRejected => "REMOTE_REJECTED",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::AlreadyInitialized | Self::DatabaseError => 2,
            Self::NotFound => 3,
            Self::InvalidArgument => 4,
            Self::Offline | Self::RemoteTransient | Self::RemoteRejected => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether repeating the same call later can succeed.
    ///
    /// True for connectivity problems and busy-database errors. False for
    /// rejected payloads, not-found, and malformed input.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Offline | Self::RemoteTransient | Self::DatabaseError
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in tripsync operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: run `tsync init` first")]
    NotInitialized,

    #[error("Already initialized at {path}")]
    AlreadyInitialized { path: PathBuf },

    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Offline: {0} requires connectivity")]
    Offline(&'static str),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a not-found error.
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::AlreadyInitialized { .. } => ErrorCode::AlreadyInitialized,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Offline(_) => ErrorCode::Offline,
            Self::Remote(RemoteError::Rejected { .. }) => ErrorCode::RemoteRejected,
            Self::Remote(_) => ErrorCode::RemoteTransient,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => Some("Run `tsync init` to initialize the database".to_string()),

            Self::AlreadyInitialized { path } => Some(format!(
                "Database already exists at {}. Use `--force` to reinitialize.",
                path.display()
            )),

            Self::NotFound { kind, .. } => Some(format!(
                "Use `tsync list {kind} --owner <user-id>` to see local records, \
                 or `tsync sync pull --owner <user-id>` to fetch remote ones."
            )),

            Self::Offline(_) => Some(
                "No connectivity. Set a remote with `--remote-url` or TRIPSYNC_REMOTE_URL, \
                 or drop `--offline`. Local saves are queued and pushed later."
                    .to_string(),
            ),

            Self::Remote(RemoteError::Rejected { status, .. }) => Some(format!(
                "The remote refused the record (HTTP {status}). Check the payload and credentials \
                 (TRIPSYNC_API_KEY)."
            )),

            Self::Remote(_) => Some(
                "The remote is unreachable or slow. Queued writes stay pending; \
                 retry with `tsync sync push`."
                    .to_string(),
            ),

            Self::InvalidArgument(msg) => {
                if msg.contains("kind") {
                    Some("Valid kinds: user, plan, trip, feedback".to_string())
                } else {
                    None
                }
            }

            Self::Database(_) | Self::Io(_) | Self::Json(_) | Self::Config(_) | Self::Other(_) => {
                None
            }
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_codes() {
        let transient = Error::from(RemoteError::Timeout);
        assert_eq!(transient.error_code(), ErrorCode::RemoteTransient);
        assert!(transient.error_code().is_retryable());

        let rejected = Error::from(RemoteError::Rejected {
            status: 422,
            message: "bad row".into(),
        });
        assert_eq!(rejected.error_code(), ErrorCode::RemoteRejected);
        assert!(!rejected.error_code().is_retryable());
        assert_eq!(rejected.exit_code(), 6);
    }

    #[test]
    fn test_structured_json() {
        let err = Error::not_found(EntityKind::Trip, "trip_1");
        let json = err.to_structured_json();
        assert_eq!(json["error"]["code"], "NOT_FOUND");
        assert_eq!(json["error"]["exit_code"], 3);
        assert_eq!(json["error"]["message"], "trip not found: trip_1");
        assert!(json["error"]["hint"].as_str().unwrap().contains("tsync list trip"));
    }

    #[test]
    fn test_offline_hint() {
        let err = Error::Offline("pull");
        assert_eq!(err.to_string(), "Offline: pull requires connectivity");
        assert!(err.hint().is_some());
    }
}
