//! Sync status display.
//!
//! Human-readable rendering of [`SyncStatus`] for `tsync sync status`.

use chrono::{DateTime, Utc};
use colored::Colorize;

use crate::queue::QueueItem;
use crate::sync::types::SyncStatus;

/// Print the sync status to stdout.
///
/// `pending` is the queue snapshot; the oldest few items are listed.
pub fn print_status(status: &SyncStatus, remote_name: &str, pending: &[QueueItem]) {
    let now = Utc::now();

    println!("{}", "Sync Status".bold().underline());
    println!();

    let connectivity = if status.online {
        "online".green()
    } else {
        "offline".red()
    };
    println!("{}", "Remote:".blue().bold());
    println!("  Store:         {remote_name}");
    println!("  Connectivity:  {connectivity}");
    if status.syncing {
        println!("  Activity:      {}", "draining queue".yellow());
    }
    match status.last_attempt {
        Some(ts) => println!("  Last attempt:  {}", format_ago(ts, now)),
        None => println!("  Last attempt:  {}", "never".dimmed()),
    }
    if let Some(err) = &status.last_error {
        println!("  Last error:    {}", err.red());
    }
    println!();

    if status.pending_count == 0 {
        println!("{}", "No pending changes.".green());
        return;
    }

    println!("{}", "Pending Sync:".yellow().bold());
    println!("  {}: {}", "Total".bold(), status.pending_count);
    for item in pending.iter().take(10) {
        let retry = if item.attempts > 0 {
            format!(" ({} attempts)", item.attempts).yellow().to_string()
        } else {
            String::new()
        };
        println!(
            "  #{:<5} {:<9} {}  queued {}{}",
            item.seq,
            item.kind.as_str(),
            item.entity_id,
            format_ago(item.enqueued_at, now),
            retry
        );
    }
    if pending.len() > 10 {
        println!("  {}", format!("... and {} more", pending.len() - 10).dimmed());
    }
    println!();

    if status.online {
        println!("{}", "Run 'tsync sync push' to push pending changes.".dimmed());
    } else {
        println!(
            "{}",
            "Pending changes will be pushed when connectivity returns.".dimmed()
        );
    }
}

/// Format an instant relative to `now` ("12s ago", "3h ago").
fn format_ago(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - ts).num_seconds();
    if secs < 0 {
        return "just now".to_string();
    }
    match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}
