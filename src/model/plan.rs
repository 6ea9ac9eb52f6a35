//! Plan model.
//!
//! A plan groups the trip options generated from one preference submission.
//! It references its trips by id, in presentation order.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::entity::{new_id, EntityKind};

/// Preferences submitted by the user when the plan was generated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanPreferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<String>,
    #[serde(default = "default_travelers")]
    pub travelers: u32,
    #[serde(default)]
    pub interests: Vec<String>,
}

const fn default_travelers() -> u32 {
    1
}

/// A plan in the trip planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Unique identifier (`plan_<uuid>`)
    pub id: String,

    /// Owning user
    pub owner_id: String,

    /// Short human title, e.g. "Long weekend in May"
    pub title: String,

    /// The submission the trips were generated from
    #[serde(default)]
    pub preferences: PlanPreferences,

    /// Trip ids, in presentation order
    #[serde(default)]
    pub trip_ids: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Plan {
    /// Create a new, empty plan.
    pub fn new(owner_id: &str, title: &str) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(EntityKind::Plan),
            owner_id: owner_id.to_string(),
            title: title.to_string(),
            preferences: PlanPreferences {
                travelers: default_travelers(),
                ..PlanPreferences::default()
            },
            trip_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_preferences(mut self, preferences: PlanPreferences) -> Self {
        self.preferences = preferences;
        self
    }

    /// Append a trip reference, ignoring duplicates.
    pub fn add_trip(&mut self, trip_id: &str) {
        if !self.trip_ids.iter().any(|t| t == trip_id) {
            self.trip_ids.push(trip_id.to_string());
        }
    }
}
