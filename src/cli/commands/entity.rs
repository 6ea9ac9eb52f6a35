//! Record commands: save, get, list, delete, history.

use std::io::Read;
use std::path::Path;

use colored::Colorize;
use serde::Serialize;

use super::{block_on, open_engine};
use crate::cli::{Cli, ListArgs, ListSort, SaveArgs};
use crate::error::{Error, Result};
use crate::model::{Entity, EntityKind};
use crate::storage::events::Event;
use crate::storage::{lock, ListFilter, ListOrder};
use crate::sync::SaveOutcome;

#[derive(Serialize)]
struct SaveOutput<'a> {
    kind: EntityKind,
    id: &'a str,
    outcome: SaveOutcome,
}

#[derive(Serialize)]
struct DeleteOutput<'a> {
    kind: EntityKind,
    id: &'a str,
    deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    trips_deleted: Option<usize>,
}

/// One-line human summary of a record.
pub(crate) fn describe(entity: &Entity) -> String {
    let detail = match entity {
        Entity::User(u) => format!("{} ({} pts)", u.display_name, u.reward_points),
        Entity::Plan(p) => format!("{} [{} trips]", p.title, p.trip_ids.len()),
        Entity::Trip(t) => {
            let star = if t.bookmarked { " *" } else { "" };
            format!(
                "{} {}..{}{}",
                t.destination.name, t.dates.start, t.dates.end, star
            )
        }
        Entity::Feedback(f) => {
            let rating = f.rating.map(|r| format!(" {r}/5")).unwrap_or_default();
            format!("{}{}: {}", f.category.as_str(), rating, f.message)
        }
    };
    format!("{} {}", entity.id().cyan(), detail)
}

pub(crate) fn outcome_label(outcome: SaveOutcome) -> colored::ColoredString {
    match outcome {
        SaveOutcome::Synced => "synced".green(),
        SaveOutcome::ConflictSkipped => "conflict skipped (remote is newer)".yellow(),
        SaveOutcome::Queued => "queued".yellow(),
    }
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

/// Parse a record. The `kind` tag selects the type.
fn parse_entity(input: &str) -> Result<Entity> {
    if input.trim().is_empty() {
        return Err(Error::InvalidArgument(
            "expected a JSON record on stdin or via --file".to_string(),
        ));
    }
    Ok(serde_json::from_str(input)?)
}

/// Execute `tsync save`.
///
/// # Errors
///
/// Returns an error if the input is not a valid record or the local write fails.
pub fn execute_save(args: &SaveArgs, cli: &Cli, json: bool) -> Result<()> {
    let mut entity = parse_entity(&read_input(args.file.as_deref())?)?;
    if !args.keep_timestamp {
        entity.touch();
    }

    let outcome = block_on(async {
        let engine = open_engine(cli).await?;
        engine.save(&entity).await
    })?;

    if json {
        let output = SaveOutput {
            kind: entity.kind(),
            id: entity.id(),
            outcome,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else if !cli.quiet {
        println!("Saved {} {} ({})", entity.kind(), entity.id(), outcome_label(outcome));
    }
    Ok(())
}

/// Execute `tsync get`.
///
/// # Errors
///
/// Returns `NotFound` if the record doesn't exist locally.
pub fn execute_get(kind: EntityKind, id: &str, cli: &Cli, json: bool) -> Result<()> {
    let entity = block_on(async {
        let engine = open_engine(cli).await?;
        engine.get(kind, id)
    })?
    .ok_or_else(|| Error::not_found(kind, id))?;

    if json {
        println!("{}", serde_json::to_string(&entity)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&entity)?);
    }
    Ok(())
}

fn list_filter(args: &ListArgs) -> ListFilter {
    ListFilter {
        order: match args.sort {
            ListSort::Newest => ListOrder::CreatedDesc,
            ListSort::Oldest => ListOrder::CreatedAsc,
            ListSort::Updated => ListOrder::UpdatedDesc,
        },
        limit: args.limit,
        plan_id: args.plan.clone(),
        bookmarked_only: args.bookmarked,
    }
}

/// Execute `tsync list`.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn execute_list(args: &ListArgs, cli: &Cli, json: bool) -> Result<()> {
    let filter = list_filter(args);
    let records = block_on(async {
        let engine = open_engine(cli).await?;
        engine.list(args.kind, &args.owner, &filter)
    })?;

    if json {
        println!("{}", serde_json::to_string(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No {} records for {}.", args.kind, args.owner);
        return Ok(());
    }
    for entity in &records {
        println!("{}", describe(entity));
    }
    println!();
    println!("{} {} record(s)", records.len(), args.kind);
    Ok(())
}

/// Execute `tsync delete`.
///
/// # Errors
///
/// Returns `InvalidArgument` for `--cascade` on a non-plan, `NotFound` for a
/// cascade on a missing plan, or a local store error.
pub fn execute_delete(kind: EntityKind, id: &str, cascade: bool, cli: &Cli, json: bool) -> Result<()> {
    if cascade && kind != EntityKind::Plan {
        return Err(Error::InvalidArgument("--cascade only applies to plans".to_string()));
    }

    let (deleted, trips_deleted) = block_on(async {
        let engine = open_engine(cli).await?;
        if cascade {
            let trips = engine.delete_plan_cascade(id).await?;
            Ok((true, Some(trips)))
        } else {
            Ok((engine.delete(kind, id).await?, None))
        }
    })?;

    if json {
        let output = DeleteOutput {
            kind,
            id,
            deleted,
            trips_deleted,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else if !deleted {
        println!("No local {kind} {id}; nothing deleted.");
    } else if let Some(trips) = trips_deleted {
        println!("Deleted {kind} {id} and {trips} trip(s)");
    } else {
        println!("Deleted {kind} {id}");
    }
    Ok(())
}

/// Execute `tsync history`.
///
/// # Errors
///
/// Returns an error if the events cannot be read.
pub fn execute_history(kind: EntityKind, id: &str, limit: u32, cli: &Cli, json: bool) -> Result<()> {
    let events: Vec<Event> = block_on(async {
        let engine = open_engine(cli).await?;
        let events = lock(engine.storage())?.get_events(kind, id, Some(limit))?;
        Ok(events)
    })?;

    if json {
        println!("{}", serde_json::to_string(&events)?);
        return Ok(());
    }

    if events.is_empty() {
        println!("No history for {kind} {id}.");
        return Ok(());
    }
    for event in &events {
        let when = chrono::DateTime::from_timestamp_millis(event.created_at)
            .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        let mut line = format!("{when}  {:<17} {}", event.event_type.as_str(), event.actor.dimmed());
        if let (Some(old), Some(new)) = (&event.old_value, &event.new_value) {
            line.push_str(&format!("  {old} -> {new}"));
        } else if let Some(new) = &event.new_value {
            line.push_str(&format!("  -> {new}"));
        }
        if let Some(comment) = &event.comment {
            line.push_str(&format!("  ({comment})"));
        }
        println!("{line}");
    }
    Ok(())
}
