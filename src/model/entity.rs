//! The tagged entity union shared by the stores, the queue and the engine.
//!
//! Every kind carries the same sync envelope (`id`, `owner_id`, `created_at`,
//! `updated_at`). [`Entity`] lets the sync layer treat them uniformly while the
//! payload stays fully typed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Feedback, Plan, Trip, User};

/// Entity kinds known to the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Plan,
    Trip,
    Feedback,
}

impl EntityKind {
    /// All kinds, in the order a pull applies them (owners before dependents).
    pub const ALL: [Self; 4] = [Self::User, Self::Plan, Self::Trip, Self::Feedback];

    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Plan => "plan",
            Self::Trip => "trip",
            Self::Feedback => "feedback",
        }
    }

    /// Table name, identical in the local and the remote schema.
    #[must_use]
    pub const fn table(&self) -> &'static str {
        match self {
            Self::User => "users",
            Self::Plan => "plans",
            Self::Trip => "trips",
            Self::Feedback => "feedback",
        }
    }

    /// Prefix used for client-generated ids.
    #[must_use]
    pub const fn id_prefix(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Plan => "plan",
            Self::Trip => "trip",
            Self::Feedback => "fb",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" | "users" => Ok(Self::User),
            "plan" | "plans" => Ok(Self::Plan),
            "trip" | "trips" => Ok(Self::Trip),
            "feedback" => Ok(Self::Feedback),
            _ => Err(format!("Unknown entity kind: {s}")),
        }
    }
}

/// Generate a fresh, globally unique id for a kind.
#[must_use]
pub fn new_id(kind: EntityKind) -> String {
    format!("{}_{}", kind.id_prefix(), uuid::Uuid::new_v4().simple())
}

/// Any syncable record.
///
/// Serialized with a `kind` tag: `{"kind":"trip","id":"trip_..",...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    User(User),
    Plan(Plan),
    Trip(Trip),
    Feedback(Feedback),
}

macro_rules! envelope {
    ($self:ident, $e:ident => $body:expr) => {
        match $self {
            Entity::User($e) => $body,
            Entity::Plan($e) => $body,
            Entity::Trip($e) => $body,
            Entity::Feedback($e) => $body,
        }
    };
}

impl Entity {
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::User(_) => EntityKind::User,
            Self::Plan(_) => EntityKind::Plan,
            Self::Trip(_) => EntityKind::Trip,
            Self::Feedback(_) => EntityKind::Feedback,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        envelope!(self, e => &e.id)
    }

    #[must_use]
    pub fn owner_id(&self) -> &str {
        envelope!(self, e => &e.owner_id)
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        envelope!(self, e => e.created_at)
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        envelope!(self, e => e.updated_at)
    }

    /// Stamp a local mutation. Never moves `updated_at` backwards.
    pub fn touch(&mut self) {
        let now = Utc::now();
        envelope!(self, e => {
            if now > e.updated_at {
                e.updated_at = now;
            }
        });
    }

    /// Basic shape checks applied before any write.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated rule.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.id().trim().is_empty() {
            return Err("id must not be empty".into());
        }
        if self.owner_id().trim().is_empty() {
            return Err("owner_id must not be empty".into());
        }
        if self.updated_at() < self.created_at() {
            return Err("updated_at must not precede created_at".into());
        }
        match self {
            Self::Trip(trip) if trip.dates.end < trip.dates.start => {
                Err("trip end date precedes start date".into())
            }
            Self::Feedback(fb) if fb.rating.is_some_and(|r| !(1..=5).contains(&r)) => {
                Err("feedback rating must be between 1 and 5".into())
            }
            _ => Ok(()),
        }
    }
}

impl From<User> for Entity {
    fn from(value: User) -> Self {
        Self::User(value)
    }
}

impl From<Plan> for Entity {
    fn from(value: Plan) -> Self {
        Self::Plan(value)
    }
}

impl From<Trip> for Entity {
    fn from(value: Trip) -> Self {
        Self::Trip(value)
    }
}

impl From<Feedback> for Entity {
    fn from(value: Feedback) -> Self {
        Self::Feedback(value)
    }
}

/// Narrow partial updates for high-frequency toggles.
///
/// Each variant names exactly one column (or one element of a nested list),
/// so the local store can apply it without a full-record round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum FieldUpdate {
    /// Trip bookmark flag.
    Bookmarked { value: bool },
    /// Check or uncheck one packing-list entry by position.
    PackingItemChecked { index: usize, checked: bool },
    /// Mark one mission done or not done.
    MissionCompleted { mission_id: String, completed: bool },
    /// Overwrite the user's reward-points counter.
    RewardPoints { value: i64 },
}

impl FieldUpdate {
    /// The entity kind this update applies to.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Bookmarked { .. }
            | Self::PackingItemChecked { .. }
            | Self::MissionCompleted { .. } => EntityKind::Trip,
            Self::RewardPoints { .. } => EntityKind::User,
        }
    }

    /// Field name used in audit events.
    #[must_use]
    pub const fn field_name(&self) -> &'static str {
        match self {
            Self::Bookmarked { .. } => "bookmarked",
            Self::PackingItemChecked { .. } => "packing_list",
            Self::MissionCompleted { .. } => "missions",
            Self::RewardPoints { .. } => "reward_points",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DateRange, Location};
    use chrono::NaiveDate;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("trip".parse::<EntityKind>().unwrap(), EntityKind::Trip);
        assert_eq!("Plans".parse::<EntityKind>().unwrap(), EntityKind::Plan);
        assert!("session".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_new_id_has_prefix() {
        let id = new_id(EntityKind::Feedback);
        assert!(id.starts_with("fb_"));
        assert_ne!(id, new_id(EntityKind::Feedback));
    }

    #[test]
    fn test_entity_tagged_json() {
        let user = User::new("Ada");
        let entity = Entity::from(user.clone());
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["kind"], "user");
        assert_eq!(json["id"], user.id.as_str());

        let back: Entity = serde_json::from_value(json).unwrap();
        assert_eq!(back, entity);
    }

    #[test]
    fn test_touch_is_monotonic() {
        let mut entity = Entity::from(User::new("Ada"));
        let future = Utc::now() + chrono::Duration::hours(1);
        if let Entity::User(u) = &mut entity {
            u.updated_at = future;
        }
        entity.touch();
        assert_eq!(entity.updated_at(), future);
    }

    #[test]
    fn test_validate_trip_dates() {
        let start = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let trip = Trip::new(
            "user_1",
            "plan_1",
            Location::new("Lisbon", 38.72, -9.14),
            DateRange { start, end },
        );
        let err = Entity::from(trip).validate().unwrap_err();
        assert!(err.contains("end date"));
    }

    #[test]
    fn test_field_update_kind() {
        assert_eq!(FieldUpdate::Bookmarked { value: true }.kind(), EntityKind::Trip);
        assert_eq!(FieldUpdate::RewardPoints { value: 10 }.kind(), EntityKind::User);
    }
}
