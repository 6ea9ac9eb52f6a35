//! User profile model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::{new_id, EntityKind};

/// A user profile with its reward-points counter.
///
/// Users own themselves: `owner_id` always equals `id`, which keeps
/// owner-scoped pulls uniform across kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub owner_id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_city: Option<String>,
    #[serde(default)]
    pub reward_points: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new user with zero points.
    pub fn new(display_name: &str) -> Self {
        let now = Utc::now();
        let id = new_id(EntityKind::User);
        Self {
            owner_id: id.clone(),
            id,
            display_name: display_name.to_string(),
            email: None,
            home_city: None,
            reward_points: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    #[must_use]
    pub fn with_home_city(mut self, city: &str) -> Self {
        self.home_city = Some(city.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_owns_itself() {
        let user = User::new("Ada").with_email("ada@example.com");
        assert!(user.id.starts_with("user_"));
        assert_eq!(user.owner_id, user.id);
        assert_eq!(user.reward_points, 0);
        assert_eq!(user.created_at, user.updated_at);
    }
}
