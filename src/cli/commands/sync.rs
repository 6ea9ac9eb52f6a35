//! Sync command implementations: push, pull, full sync and queue inspection.

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use tracing::info;

use super::{block_on, open_engine, open_engine_with};
use crate::cli::{Cli, RemoteKind, SyncCommands};
use crate::config::{load_config, probe_interval, resolve_remote};
use crate::error::{Error, Result};
use crate::model::EntityKind;
use crate::network::{spawn_probe, Connectivity};
use crate::queue::DrainResult;
use crate::remote::RemoteStore;
use crate::sync::{print_status, EntityStats, PullReport, SyncAllReport};

/// Execute sync commands.
///
/// # Errors
///
/// Returns `Offline` for commands that need the remote while offline, a
/// remote error when a pull keeps failing, or a local store error.
pub fn execute(command: &SyncCommands, cli: &Cli, json: bool) -> Result<()> {
    match command {
        SyncCommands::All { owner } => all(owner, cli, json),
        SyncCommands::Pull { owner } => pull(owner, cli, json),
        SyncCommands::Push => push(cli, json),
        SyncCommands::Status => status(cli, json),
        SyncCommands::Queue => queue(cli, json),
        SyncCommands::Clear => clear(cli, json),
        SyncCommands::Watch { interval } => watch(*interval, cli, json),
    }
}

fn print_drain(result: &DrainResult) {
    match result {
        DrainResult::AlreadyRunning => {
            println!("{}", "Another push is in progress; nothing done.".yellow());
        }
        DrainResult::Completed(report) if report.attempted == 0 => {
            println!("Nothing to push.");
        }
        DrainResult::Completed(report) => {
            println!("Pushed {} of {} queued write(s)", report.succeeded, report.attempted);
            if report.retried > 0 {
                println!("  {} will be retried", report.retried.to_string().yellow());
            }
            if report.dropped > 0 {
                println!(
                    "  {} dropped after repeated rejections (see `tsync history`)",
                    report.dropped.to_string().red()
                );
            }
            println!("  Remaining: {}", report.remaining);
        }
    }
}

fn push(cli: &Cli, json: bool) -> Result<()> {
    let result = block_on(async {
        let engine = open_engine(cli).await?;
        engine.manual_sync().await
    })?;

    if json {
        println!("{}", serde_json::to_string(&result)?);
    } else {
        print_drain(&result);
    }
    Ok(())
}

fn print_entity_stats(kind: EntityKind, stats: &EntityStats) {
    if stats.total() > 0 {
        let mut line = format!(
            "  {:<9} {} created, {} updated, {} skipped",
            kind.table(),
            stats.created,
            stats.updated,
            stats.skipped
        );
        if stats.rejected > 0 {
            line.push_str(&format!(", {} rejected", stats.rejected.to_string().red()));
        }
        println!("{line}");
    }
}

fn print_pull(report: &PullReport) {
    let total = report.total_processed();
    if total == 0 {
        println!("No remote records for {}.", report.owner_id);
        return;
    }
    println!("Pull complete for: {}", report.owner_id);
    println!();
    for kind in EntityKind::ALL {
        print_entity_stats(kind, report.stats(kind));
    }
    println!();
    let rejected = report.total_rejected();
    println!(
        "Total: {} applied, {} already up to date",
        report.total_applied(),
        total - report.total_applied() - rejected
    );
    if rejected > 0 {
        println!(
            "  {} remote record(s) not applied (see log for details)",
            rejected.to_string().yellow()
        );
    }
}

fn pull(owner: &str, cli: &Cli, json: bool) -> Result<()> {
    let report = block_on(async {
        let engine = open_engine(cli).await?;
        engine.pull(owner).await
    })?;

    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        print_pull(&report);
    }
    Ok(())
}

fn print_all(report: &SyncAllReport) {
    println!("Sync complete for: {}", report.owner_id);
    println!();
    println!("  Pushed:    {}", report.pushed);
    if report.conflicts > 0 {
        println!(
            "  Skipped:   {} (remote is newer; run `tsync sync pull --owner {}`)",
            report.conflicts.to_string().yellow(),
            report.owner_id
        );
    }
    if report.queued > 0 {
        println!("  Queued:    {}", report.queued.to_string().yellow());
    }
    println!();
    print_drain(&report.drain);
}

fn all(owner: &str, cli: &Cli, json: bool) -> Result<()> {
    let report = block_on(async {
        let engine = open_engine(cli).await?;
        engine.sync_all(owner).await
    })?;

    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        print_all(&report);
    }
    Ok(())
}

fn status(cli: &Cli, json: bool) -> Result<()> {
    let (status, remote_name, pending) = block_on(async {
        let engine = open_engine(cli).await?;
        Ok((
            engine.status()?,
            engine.remote().name().to_string(),
            engine.queue_snapshot()?,
        ))
    })?;

    if json {
        let output = serde_json::json!({
            "remote": remote_name,
            "status": status,
            "pending": pending,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else {
        print_status(&status, &remote_name, &pending);
    }
    Ok(())
}

fn queue(cli: &Cli, json: bool) -> Result<()> {
    let items = block_on(async {
        let engine = open_engine(cli).await?;
        engine.queue_snapshot()
    })?;

    if json {
        println!("{}", serde_json::to_string(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }
    for item in &items {
        let mut line = format!(
            "#{:<5} {:<9} {}  {}",
            item.seq,
            item.kind.as_str(),
            item.entity_id.cyan(),
            crate::storage::format_timestamp(&item.enqueued_at)
        );
        if item.attempts > 0 {
            line.push_str(&format!("  attempts={}", item.attempts));
        }
        if let Some(err) = &item.last_error {
            line.push_str(&format!("  {}", err.red()));
        }
        println!("{line}");
    }
    println!();
    println!("{} queued write(s)", items.len());
    Ok(())
}

fn clear(cli: &Cli, json: bool) -> Result<()> {
    let removed = block_on(async {
        let engine = open_engine(cli).await?;
        engine.clear_queue()
    })?;

    if json {
        println!("{}", serde_json::json!({ "removed": removed }));
    } else {
        println!("Discarded {removed} queued write(s)");
    }
    Ok(())
}

fn connectivity_line(state: Connectivity) -> String {
    let label = match state {
        Connectivity::Online => state.as_str().green(),
        Connectivity::Offline => state.as_str().red(),
    };
    format!("{} {label}", "Connectivity:".bold())
}

/// Keep running until Ctrl-C, probing the remote and draining the queue on
/// every offline to online transition.
fn watch(interval: Option<u64>, cli: &Cli, json: bool) -> Result<()> {
    if cli.offline {
        return Err(Error::InvalidArgument(
            "`sync watch` probes the remote and cannot run with --offline".to_string(),
        ));
    }
    let config = load_config()?;
    if cli.remote == RemoteKind::Http && resolve_remote(cli.remote_url.as_deref(), &config).url.is_none() {
        return Err(Error::Config(
            "no remote URL configured; set TRIPSYNC_REMOTE_URL or pass --remote-url".to_string(),
        ));
    }
    let interval = interval.map_or_else(|| probe_interval(&config), |secs| Duration::from_secs(secs.max(1)));
    let quiet = cli.quiet;

    block_on(async {
        let engine = Arc::new(open_engine_with(cli, &config).await?);

        let subscription = engine.network().subscribe(move |state| {
            if json {
                println!("{}", serde_json::json!({ "event": "connectivity", "state": state }));
            } else if !quiet {
                println!("{}", connectivity_line(state));
            }
        });
        let probe = spawn_probe(
            Arc::clone(engine.network()),
            Arc::clone(engine.remote()),
            interval,
        );
        let listener = Arc::clone(&engine).spawn_reconnect_listener();
        info!(
            remote = engine.remote().name(),
            interval_secs = interval.as_secs(),
            "Watching connectivity"
        );

        tokio::signal::ctrl_c().await?;
        probe.abort();
        listener.abort();
        engine.network().unsubscribe(subscription);

        let pending = engine.status()?.pending_count;
        if json {
            println!("{}", serde_json::json!({ "event": "stopped", "pending": pending }));
        } else if !quiet {
            println!("Stopped. {pending} write(s) still queued.");
        }
        Ok(())
    })
}
