//! Configuration management.
//!
//! Settings come from three layers, later layers winning:
//!
//! 1. `~/.tripsync/config.json` (every field optional)
//! 2. `TRIPSYNC_*` environment variables
//! 3. CLI flags (applied by the caller)
//!
//! The database lives at `~/.tripsync/data/tripsync.db` unless overridden.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::sync::{BackoffPolicy, SyncSettings};

const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 5000;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;
const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_MAX_REJECTIONS: u32 = 5;
const DEFAULT_PROBE_INTERVAL_SECS: u64 = 30;

/// Contents of `config.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TripsyncConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
    /// Base URL of the remote store, without `/rest/v1`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_base_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_max_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rejections: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_interval_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

/// Get the global tripsync directory (`~/.tripsync`).
#[must_use]
pub fn global_tripsync_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".tripsync"))
}

/// Get the config file path.
///
/// # Errors
///
/// Returns `Error::Config` if the home directory cannot be determined.
pub fn config_path() -> Result<PathBuf> {
    global_tripsync_dir()
        .map(|dir| dir.join("config.json"))
        .ok_or_else(|| Error::Config("Could not determine home directory".into()))
}

/// Load the configuration file. A missing file yields the defaults.
///
/// # Errors
///
/// Returns `Error::Config` if the file exists but cannot be read or parsed.
pub fn load_config() -> Result<TripsyncConfig> {
    load_config_from(&config_path()?)
}

/// Load a configuration file from an explicit path.
///
/// # Errors
///
/// Returns `Error::Config` if the file exists but cannot be read or parsed.
pub fn load_config_from(path: &Path) -> Result<TripsyncConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "No config file; using defaults");
        return Ok(TripsyncConfig::default());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;

    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config file {}: {e}", path.display())))
}

/// Write a configuration file, creating its directory.
///
/// # Errors
///
/// Returns `Error::Config` if the file cannot be written.
pub fn save_config_to(path: &Path, config: &TripsyncConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::Config(format!("Failed to create config directory: {e}")))?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;

    fs::write(path, content).map_err(|e| Error::Config(format!("Failed to write config file: {e}")))
}

/// Read a non-empty environment variable.
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Resolve the database path.
///
/// Priority:
/// 1. `explicit_path` (the `--db` flag)
/// 2. `TRIPSYNC_DB` environment variable
/// 3. `db_path` in the config file
/// 4. `~/.tripsync/data/tripsync.db`
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>, config: &TripsyncConfig) -> Option<PathBuf> {
    resolve_db_path_with(explicit_path, config, env_var)
}

fn resolve_db_path_with(
    explicit_path: Option<&Path>,
    config: &TripsyncConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }
    if let Some(path) = env("TRIPSYNC_DB") {
        return Some(PathBuf::from(path));
    }
    if let Some(path) = &config.db_path {
        return Some(path.clone());
    }
    global_tripsync_dir().map(|dir| dir.join("data").join("tripsync.db"))
}

/// Remote connection settings after layering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteConfig {
    /// `None` means no remote is configured; the engine starts offline.
    pub url: Option<String>,
    pub api_key: Option<String>,
}

/// Resolve the remote URL and key. `explicit_url` is the `--remote-url` flag.
#[must_use]
pub fn resolve_remote(explicit_url: Option<&str>, config: &TripsyncConfig) -> RemoteConfig {
    resolve_remote_with(explicit_url, config, env_var)
}

fn resolve_remote_with(
    explicit_url: Option<&str>,
    config: &TripsyncConfig,
    env: impl Fn(&str) -> Option<String>,
) -> RemoteConfig {
    let url = explicit_url
        .map(str::to_string)
        .or_else(|| env("TRIPSYNC_REMOTE_URL"))
        .or_else(|| config.remote_url.clone());
    let api_key = env("TRIPSYNC_API_KEY").or_else(|| config.api_key.clone());
    RemoteConfig { url, api_key }
}

/// Resolve the engine settings from the config file and environment.
///
/// # Errors
///
/// Returns `Error::Config` if `TRIPSYNC_REMOTE_TIMEOUT_MS` is not a number.
pub fn resolve_settings(config: &TripsyncConfig) -> Result<SyncSettings> {
    resolve_settings_with(config, env_var)
}

fn resolve_settings_with(
    config: &TripsyncConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<SyncSettings> {
    let timeout_ms = match env("TRIPSYNC_REMOTE_TIMEOUT_MS") {
        Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
            Error::Config(format!("TRIPSYNC_REMOTE_TIMEOUT_MS must be milliseconds, got '{raw}'"))
        })?,
        None => config.remote_timeout_ms.unwrap_or(DEFAULT_REMOTE_TIMEOUT_MS),
    };

    let actor = env("TRIPSYNC_ACTOR")
        .or_else(|| config.actor.clone())
        .or_else(|| env("USER"))
        .unwrap_or_else(|| "unknown".to_string());

    Ok(SyncSettings {
        remote_timeout: Duration::from_millis(timeout_ms),
        retry: BackoffPolicy {
            max_attempts: config.retry_max_attempts.unwrap_or(DEFAULT_RETRY_MAX_ATTEMPTS),
            base_delay: Duration::from_millis(
                config.retry_base_delay_ms.unwrap_or(DEFAULT_RETRY_BASE_DELAY_MS),
            ),
        },
        max_rejections: config.max_rejections.unwrap_or(DEFAULT_MAX_REJECTIONS),
        actor,
    })
}

/// Interval between connectivity probes.
#[must_use]
pub fn probe_interval(config: &TripsyncConfig) -> Duration {
    Duration::from_secs(
        config
            .probe_interval_secs
            .unwrap_or(DEFAULT_PROBE_INTERVAL_SECS)
            .max(1),
    )
}

/// Get the default actor name.
///
/// Priority:
/// 1. `TRIPSYNC_ACTOR` environment variable
/// 2. System username
/// 3. "unknown"
#[must_use]
pub fn default_actor() -> String {
    env_var("TRIPSYNC_ACTOR")
        .or_else(|| env_var("USER"))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn test_default_actor() {
        let actor = default_actor();
        assert!(!actor.is_empty());
    }

    #[test]
    fn test_resolve_db_path_priority() {
        let explicit = PathBuf::from("/custom/path/db.sqlite");
        let config = TripsyncConfig {
            db_path: Some(PathBuf::from("/from/config.db")),
            ..TripsyncConfig::default()
        };
        let env = env_of(&[("TRIPSYNC_DB", "/from/env.db")]);

        assert_eq!(resolve_db_path_with(Some(&explicit), &config, &env), Some(explicit));
        assert_eq!(
            resolve_db_path_with(None, &config, &env),
            Some(PathBuf::from("/from/env.db"))
        );
        assert_eq!(
            resolve_db_path_with(None, &config, env_of(&[])),
            Some(PathBuf::from("/from/config.db"))
        );
    }

    #[test]
    fn test_resolve_db_path_defaults_to_global() {
        let path = resolve_db_path_with(None, &TripsyncConfig::default(), env_of(&[])).unwrap();
        assert!(path.ends_with("data/tripsync.db"));
        assert!(path.to_string_lossy().contains(".tripsync"));
    }

    #[test]
    fn test_resolve_remote_layers() {
        let config = TripsyncConfig {
            remote_url: Some("https://config.example".into()),
            api_key: Some("config-key".into()),
            ..TripsyncConfig::default()
        };

        let remote = resolve_remote_with(None, &config, env_of(&[("TRIPSYNC_API_KEY", "env-key")]));
        assert_eq!(remote.url.as_deref(), Some("https://config.example"));
        assert_eq!(remote.api_key.as_deref(), Some("env-key"));

        let remote = resolve_remote_with(
            Some("https://flag.example"),
            &config,
            env_of(&[("TRIPSYNC_REMOTE_URL", "https://env.example")]),
        );
        assert_eq!(remote.url.as_deref(), Some("https://flag.example"));

        let none = resolve_remote_with(None, &TripsyncConfig::default(), env_of(&[]));
        assert_eq!(none, RemoteConfig::default());
    }

    #[test]
    fn test_resolve_settings_defaults() {
        let settings = resolve_settings_with(&TripsyncConfig::default(), env_of(&[])).unwrap();
        assert_eq!(settings.remote_timeout, Duration::from_millis(5000));
        assert_eq!(settings.retry.base_delay, Duration::from_millis(1000));
        assert_eq!(settings.retry.max_attempts, 3);
        assert_eq!(settings.max_rejections, 5);
        assert_eq!(settings.actor, "unknown");
    }

    #[test]
    fn test_resolve_settings_env_overrides_config() {
        let config = TripsyncConfig {
            remote_timeout_ms: Some(100),
            actor: Some("config-actor".into()),
            max_rejections: Some(9),
            ..TripsyncConfig::default()
        };
        let env = env_of(&[("TRIPSYNC_REMOTE_TIMEOUT_MS", "250"), ("USER", "shell-user")]);
        let settings = resolve_settings_with(&config, env).unwrap();
        assert_eq!(settings.remote_timeout, Duration::from_millis(250));
        assert_eq!(settings.actor, "config-actor");
        assert_eq!(settings.max_rejections, 9);
    }

    #[test]
    fn test_invalid_timeout_is_config_error() {
        let err = resolve_settings_with(
            &TripsyncConfig::default(),
            env_of(&[("TRIPSYNC_REMOTE_TIMEOUT_MS", "soon")]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_config_file_roundtrip_and_partial_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        assert_eq!(load_config_from(&path).unwrap(), TripsyncConfig::default());

        let config = TripsyncConfig {
            remote_url: Some("https://abc.supabase.co".into()),
            probe_interval_secs: Some(10),
            ..TripsyncConfig::default()
        };
        save_config_to(&path, &config).unwrap();
        assert_eq!(load_config_from(&path).unwrap(), config);
        assert_eq!(probe_interval(&config), Duration::from_secs(10));

        fs::write(&path, r#"{"max_rejections": 2, "unknown_key": true}"#).unwrap();
        assert_eq!(load_config_from(&path).unwrap().max_rejections, Some(2));

        fs::write(&path, "not json").unwrap();
        assert!(matches!(load_config_from(&path), Err(Error::Config(_))));
    }
}
