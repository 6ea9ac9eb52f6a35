//! Data models for the trip planner's synced entities.
//!
//! This module contains all domain models:
//! - User
//! - Plan
//! - Trip
//! - Feedback
//!
//! plus the [`Entity`] union and [`FieldUpdate`] used by the sync layer.

pub mod entity;
pub mod feedback;
pub mod plan;
pub mod trip;
pub mod user;

pub use entity::{new_id, Entity, EntityKind, FieldUpdate};
pub use feedback::{Feedback, FeedbackCategory};
pub use plan::{Plan, PlanPreferences};
pub use trip::{
    Activity, ChatEntry, ChatRole, Coordinates, DateRange, DaySchedule, Location, Mission,
    PackingItem, Trip,
};
pub use user::User;
