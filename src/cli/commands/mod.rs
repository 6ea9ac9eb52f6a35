//! Command implementations.
//!
//! Every command that touches records goes through [`open_engine`], which
//! layers config file, environment and flags into a ready [`SyncEngine`].

pub mod completions;
pub mod entity;
pub mod field;
pub mod init;
pub mod sync;
pub mod version;

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info};

use crate::cli::{Cli, RemoteKind};
use crate::config::{load_config, resolve_db_path, resolve_remote, resolve_settings, TripsyncConfig};
use crate::error::{Error, Result};
use crate::network::{Connectivity, NetworkMonitor};
use crate::remote::{BoxedRemote, HttpRemoteStore, MemoryRemoteStore, RemoteStore};
use crate::storage::{shared, SqliteStorage};
use crate::sync::SyncEngine;

/// Engine type used by the CLI: the remote is picked at runtime.
pub type CliEngine = SyncEngine<Arc<BoxedRemote>>;

/// Run a future to completion on a fresh runtime.
///
/// # Errors
///
/// Returns an error if the runtime cannot be created, or the future's error.
pub fn block_on<T, F>(future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))?;
    rt.block_on(future)
}

/// Open the database and build an engine from config and flags.
///
/// Connectivity starts from a single ping unless `--offline` is set or no
/// remote URL is configured.
///
/// # Errors
///
/// Returns `NotInitialized` if the database doesn't exist, or a config error.
pub async fn open_engine(cli: &Cli) -> Result<CliEngine> {
    let config = load_config()?;
    open_engine_with(cli, &config).await
}

async fn open_engine_with(cli: &Cli, config: &TripsyncConfig) -> Result<CliEngine> {
    let db_path = resolve_db_path(cli.db.as_deref(), config).ok_or(Error::NotInitialized)?;
    if !db_path.exists() {
        return Err(Error::NotInitialized);
    }
    let storage = SqliteStorage::open(&db_path)?;

    let mut settings = resolve_settings(config)?;
    if let Some(actor) = &cli.actor {
        settings.actor.clone_from(actor);
    }

    let (remote, configured) = match cli.remote {
        RemoteKind::Memory => (BoxedRemote::new(MemoryRemoteStore::new()), true),
        RemoteKind::Http => {
            let remote_config = resolve_remote(cli.remote_url.as_deref(), config);
            match remote_config.url {
                Some(url) => (
                    BoxedRemote::new(HttpRemoteStore::new(
                        &url,
                        remote_config.api_key,
                        settings.remote_timeout,
                    )),
                    true,
                ),
                None => {
                    debug!("No remote URL configured; running offline");
                    (BoxedRemote::new(MemoryRemoteStore::new()), false)
                }
            }
        }
    };
    let remote = Arc::new(remote);

    let connectivity = if cli.offline || !configured {
        Connectivity::Offline
    } else {
        Connectivity::from_online(remote.ping().await)
    };
    info!(
        db = %db_path.display(),
        remote = remote.name(),
        state = connectivity.as_str(),
        "Engine ready"
    );

    let network = Arc::new(NetworkMonitor::new(connectivity));
    Ok(SyncEngine::new(shared(storage), remote, network, settings))
}
