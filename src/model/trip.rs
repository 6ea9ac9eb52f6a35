//! Trip model.
//!
//! A trip is one recommended destination inside a plan: where, when, what to
//! do each day, what to pack, gamified missions, and the chat transcript with
//! the assistant that produced it.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::entity::{new_id, EntityKind};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    pub coordinates: Coordinates,
}

impl Location {
    pub fn new(name: &str, lat: f64, lng: f64) -> Self {
        Self {
            name: name.to_string(),
            country: None,
            coordinates: Coordinates { lat, lng },
        }
    }
}

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Number of calendar days covered (inclusive).
    #[must_use]
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Activities planned for one day of the trip (day numbers start at 1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySchedule {
    pub day: u32,
    #[serde(default)]
    pub activities: Vec<Activity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackingItem {
    pub name: String,
    #[serde(default)]
    pub checked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mission {
    pub id: String,
    pub title: String,
    pub points: u32,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub role: ChatRole,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

/// A recommended trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: String,
    pub owner_id: String,
    /// Plan this trip was generated for. Not enforced referentially.
    pub plan_id: String,
    pub destination: Location,
    pub dates: DateRange,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub schedule: Vec<DaySchedule>,
    #[serde(default)]
    pub packing_list: Vec<PackingItem>,
    #[serde(default)]
    pub missions: Vec<Mission>,
    #[serde(default)]
    pub bookmarked: bool,
    #[serde(default)]
    pub chat: Vec<ChatEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trip {
    /// Create a new trip with empty itinerary lists.
    pub fn new(owner_id: &str, plan_id: &str, destination: Location, dates: DateRange) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(EntityKind::Trip),
            owner_id: owner_id.to_string(),
            plan_id: plan_id.to_string(),
            destination,
            dates,
            highlights: Vec::new(),
            amenities: Vec::new(),
            schedule: Vec::new(),
            packing_list: Vec::new(),
            missions: Vec::new(),
            bookmarked: false,
            chat: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_packing_list(mut self, items: &[&str]) -> Self {
        self.packing_list = items
            .iter()
            .map(|name| PackingItem {
                name: (*name).to_string(),
                checked: false,
            })
            .collect();
        self
    }

    #[must_use]
    pub fn with_mission(mut self, id: &str, title: &str, points: u32) -> Self {
        self.missions.push(Mission {
            id: id.to_string(),
            title: title.to_string(),
            points,
            completed: false,
        });
        self
    }

    /// Points earned from completed missions.
    #[must_use]
    pub fn earned_points(&self) -> u32 {
        self.missions
            .iter()
            .filter(|m| m.completed)
            .map(|m| m.points)
            .sum()
    }
}
