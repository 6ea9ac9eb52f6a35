//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::model::EntityKind;

pub mod commands;

/// tripsync - offline-first sync for trip plans
#[derive(Parser, Debug)]
#[command(name = "tsync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.tripsync/data/tripsync.db)
    #[arg(long, global = true, env = "TRIPSYNC_DB")]
    pub db: Option<PathBuf>,

    /// Remote store implementation
    #[arg(long, value_enum, global = true, default_value_t)]
    pub remote: RemoteKind,

    /// Remote base URL (overrides TRIPSYNC_REMOTE_URL and the config file)
    #[arg(long, global = true)]
    pub remote_url: Option<String>,

    /// Treat the remote as unreachable; writes are queued
    #[arg(long, global = true)]
    pub offline: bool,

    /// Actor name for the audit trail
    #[arg(long, global = true, env = "TRIPSYNC_ACTOR")]
    pub actor: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Which remote store backs the engine.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RemoteKind {
    /// PostgREST-style HTTP API (needs a remote URL)
    #[default]
    Http,
    /// In-process store, empty on every run (dry runs)
    Memory,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the local database and config directory
    Init {
        /// Recreate the database if it exists
        #[arg(long)]
        force: bool,
    },

    /// Print version information
    Version,

    /// Save a full record (JSON with a "kind" tag)
    Save(SaveArgs),

    /// Show one record from the local store
    Get {
        #[arg(value_parser = parse_kind)]
        kind: EntityKind,
        id: String,
    },

    /// List an owner's records from the local store
    List(ListArgs),

    /// Delete a record locally and, when online, remotely
    Delete {
        #[arg(value_parser = parse_kind)]
        kind: EntityKind,
        id: String,

        /// For plans: delete the plan's trips first
        #[arg(long)]
        cascade: bool,
    },

    /// Toggle a single field
    Field {
        #[command(subcommand)]
        command: FieldCommands,
    },

    /// Push, pull and inspect the sync queue
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },

    /// Show the audit history of a record
    History {
        #[arg(value_parser = parse_kind)]
        kind: EntityKind,
        id: String,

        /// Maximum events to show
        #[arg(long, short, default_value = "20")]
        limit: u32,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

fn parse_kind(s: &str) -> std::result::Result<EntityKind, String> {
    s.parse()
}

#[derive(Args, Debug)]
pub struct SaveArgs {
    /// Read the record from a file instead of stdin
    #[arg(long, short)]
    pub file: Option<PathBuf>,

    /// Keep the record's `updated_at` instead of stamping it now
    #[arg(long)]
    pub keep_timestamp: bool,
}

/// Sort order for `list`.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ListSort {
    /// Newest first
    #[default]
    Newest,
    /// Oldest first
    Oldest,
    /// Most recently updated first
    Updated,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(value_parser = parse_kind)]
    pub kind: EntityKind,

    /// Owning user id
    #[arg(long)]
    pub owner: String,

    /// Only trips of this plan
    #[arg(long)]
    pub plan: Option<String>,

    /// Only bookmarked trips
    #[arg(long)]
    pub bookmarked: bool,

    #[arg(long, value_enum, default_value_t)]
    pub sort: ListSort,

    /// Maximum records to show
    #[arg(long, short)]
    pub limit: Option<u32>,
}

#[derive(Subcommand, Debug)]
pub enum FieldCommands {
    /// Bookmark a trip (or clear the bookmark)
    Bookmark {
        trip_id: String,
        /// Clear the bookmark instead
        #[arg(long)]
        off: bool,
    },

    /// Check a packing-list item by position (0-based)
    Pack {
        trip_id: String,
        index: usize,
        /// Uncheck instead
        #[arg(long)]
        uncheck: bool,
    },

    /// Complete a trip mission
    Mission {
        trip_id: String,
        mission_id: String,
        /// Mark as not completed instead
        #[arg(long)]
        undo: bool,
    },

    /// Set a user's reward points
    Points { user_id: String, value: i64 },
}

#[derive(Subcommand, Debug)]
pub enum SyncCommands {
    /// Push every local record of an owner, then drain the queue
    All {
        #[arg(long)]
        owner: String,
    },

    /// Fetch an owner's remote records and apply the newer ones
    Pull {
        #[arg(long)]
        owner: String,
    },

    /// Push queued writes now
    Push,

    /// Show connectivity and queue state
    Status,

    /// List queued writes
    Queue,

    /// Discard every queued write
    Clear,

    /// Stay running: probe connectivity and push on reconnect
    Watch {
        /// Seconds between connectivity probes (default from config: 30)
        #[arg(long)]
        interval: Option<u64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_field_command() {
        let cli = Cli::try_parse_from(["tsync", "--offline", "field", "pack", "trip_1", "2", "--uncheck"])
            .unwrap();
        assert!(cli.offline);
        match cli.command {
            Commands::Field {
                command: FieldCommands::Pack { trip_id, index, uncheck },
            } => {
                assert_eq!(trip_id, "trip_1");
                assert_eq!(index, 2);
                assert!(uncheck);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_kind_argument() {
        let cli = Cli::try_parse_from(["tsync", "get", "trips", "trip_1"]).unwrap();
        assert!(matches!(cli.command, Commands::Get { kind: EntityKind::Trip, .. }));
        assert!(Cli::try_parse_from(["tsync", "get", "session", "x"]).is_err());
    }
}
