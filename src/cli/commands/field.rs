//! Single-field toggles: bookmark, packing item, mission, reward points.

use serde::Serialize;

use super::entity::outcome_label;
use super::{block_on, open_engine};
use crate::cli::{Cli, FieldCommands};
use crate::error::Result;
use crate::model::FieldUpdate;
use crate::sync::SaveOutcome;

#[derive(Serialize)]
struct FieldOutput<'a> {
    id: &'a str,
    #[serde(flatten)]
    update: &'a FieldUpdate,
    outcome: SaveOutcome,
}

/// Split a field command into the target id and the update to apply.
fn to_update(command: &FieldCommands) -> (&str, FieldUpdate) {
    match command {
        FieldCommands::Bookmark { trip_id, off } => {
            (trip_id.as_str(), FieldUpdate::Bookmarked { value: !off })
        }
        FieldCommands::Pack {
            trip_id,
            index,
            uncheck,
        } => (
            trip_id.as_str(),
            FieldUpdate::PackingItemChecked {
                index: *index,
                checked: !uncheck,
            },
        ),
        FieldCommands::Mission {
            trip_id,
            mission_id,
            undo,
        } => (
            trip_id.as_str(),
            FieldUpdate::MissionCompleted {
                mission_id: mission_id.clone(),
                completed: !undo,
            },
        ),
        FieldCommands::Points { user_id, value } => {
            (user_id.as_str(), FieldUpdate::RewardPoints { value: *value })
        }
    }
}

/// Execute `tsync field` commands.
///
/// # Errors
///
/// Returns `NotFound` if the record doesn't exist locally, or
/// `InvalidArgument` for an unknown packing index or mission id.
pub fn execute(command: &FieldCommands, cli: &Cli, json: bool) -> Result<()> {
    let (id, update) = to_update(command);

    let outcome = block_on(async {
        let engine = open_engine(cli).await?;
        engine.update_field(id, &update).await
    })?;

    if json {
        let output = FieldOutput {
            id,
            update: &update,
            outcome,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else if !cli.quiet {
        println!(
            "Updated {} on {} {} ({})",
            update.field_name(),
            update.kind(),
            id,
            outcome_label(outcome)
        );
    }
    Ok(())
}
