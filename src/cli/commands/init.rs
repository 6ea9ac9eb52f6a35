//! Initialize the local database.
//!
//! Creates the database file (schema and migrations are applied on open) and,
//! when the default location is used, a `config.json` template next to it in
//! `~/.tripsync/`.

use crate::config::{config_path, load_config, resolve_db_path, save_config_to, TripsyncConfig};
use crate::error::{Error, Result};
use crate::storage::SqliteStorage;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct InitOutput {
    database: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<PathBuf>,
}

/// Execute the init command.
///
/// `explicit_db` is the `--db` flag. With an explicit path no config file is
/// written.
///
/// # Errors
///
/// Returns `AlreadyInitialized` if the database exists and `force` is not
/// set, or an error if the directory or database cannot be created.
pub fn execute(explicit_db: Option<&Path>, force: bool, json: bool) -> Result<()> {
    let config = load_config()?;
    let db_path = resolve_db_path(explicit_db, &config)
        .ok_or_else(|| Error::Config("Could not determine database location".to_string()))?;

    let config_file = if explicit_db.is_none() {
        Some(config_path()?)
    } else {
        None
    };

    let output = init_at(&db_path, config_file.as_deref(), force)?;

    if json {
        let payload = serde_json::to_string(&output)?;
        println!("{payload}");
    } else {
        println!("Initialized tripsync database");
        println!("  Database: {}", output.database.display());
        if let Some(config) = &output.config {
            println!("  Config:   {}", config.display());
        }
        println!();
        println!("Next: set TRIPSYNC_REMOTE_URL (or \"remote_url\" in the config) to enable sync.");
    }

    Ok(())
}

fn init_at(db_path: &Path, config_file: Option<&Path>, force: bool) -> Result<InitOutput> {
    if db_path.exists() {
        if !force {
            return Err(Error::AlreadyInitialized {
                path: db_path.to_path_buf(),
            });
        }
        fs::remove_file(db_path)?;
        for suffix in ["-wal", "-shm"] {
            let sidecar = PathBuf::from(format!("{}{suffix}", db_path.display()));
            if sidecar.exists() {
                fs::remove_file(sidecar)?;
            }
        }
    }

    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    SqliteStorage::open(db_path)?;

    let config = match config_file {
        Some(path) if !path.exists() => {
            save_config_to(path, &TripsyncConfig::default())?;
            Some(path.to_path_buf())
        }
        Some(path) => Some(path.to_path_buf()),
        None => None,
    };

    Ok(InitOutput {
        database: db_path.to_path_buf(),
        config,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::User;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_database_and_config() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("data").join("tripsync.db");
        let config = dir.path().join("config.json");

        let output = init_at(&db, Some(&config), false).unwrap();

        assert!(db.exists());
        assert_eq!(output.config.as_deref(), Some(config.as_path()));
        assert!(config.exists());
        let storage = SqliteStorage::open(&db).unwrap();
        assert_eq!(storage.queue_len().unwrap(), 0);
    }

    #[test]
    fn test_init_fails_if_already_initialized() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("tripsync.db");

        init_at(&db, None, false).unwrap();
        let result = init_at(&db, None, false);
        assert!(matches!(result, Err(Error::AlreadyInitialized { .. })));
    }

    #[test]
    fn test_init_force_recreates_database() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("tripsync.db");
        init_at(&db, None, false).unwrap();

        let user = User::new("Ada");
        {
            let mut storage = SqliteStorage::open(&db).unwrap();
            storage.save_entity(&user.clone().into(), "test").unwrap();
        }

        init_at(&db, None, true).unwrap();
        let storage = SqliteStorage::open(&db).unwrap();
        assert!(storage
            .get_entity(crate::model::EntityKind::User, &user.id)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_existing_config_is_kept() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("tripsync.db");
        let config = dir.path().join("config.json");
        fs::write(&config, r#"{"remote_url":"https://keep.example"}"#).unwrap();

        init_at(&db, Some(&config), false).unwrap();
        let content = fs::read_to_string(&config).unwrap();
        assert!(content.contains("keep.example"));
    }
}
