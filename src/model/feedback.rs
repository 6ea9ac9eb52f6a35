//! User-submitted feedback. Immutable after creation apart from timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::{new_id, EntityKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackCategory {
    Bug,
    Suggestion,
    Content,
    Other,
}

impl FeedbackCategory {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bug => "bug",
            Self::Suggestion => "suggestion",
            Self::Content => "content",
            Self::Other => "other",
        }
    }

    /// Parse from string.
    #[must_use]
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "bug" => Self::Bug,
            "suggestion" => Self::Suggestion,
            "content" => Self::Content,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub id: String,
    pub owner_id: String,
    pub category: FeedbackCategory,
    pub message: String,
    /// Trip the report is about, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_id: Option<String>,
    /// 1..=5
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Feedback {
    pub fn new(owner_id: &str, category: FeedbackCategory, message: &str) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(EntityKind::Feedback),
            owner_id: owner_id.to_string(),
            category,
            message: message.to_string(),
            trip_id: None,
            rating: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn about_trip(mut self, trip_id: &str) -> Self {
        self.trip_id = Some(trip_id.to_string());
        self
    }

    #[must_use]
    pub fn with_rating(mut self, rating: u8) -> Self {
        self.rating = Some(rating);
        self
    }

    /// Whether two reports carry the same content. Timestamps are ignored.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.owner_id == other.owner_id
            && self.category == other.category
            && self.message == other.message
            && self.trip_id == other.trip_id
            && self.rating == other.rating
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parsing() {
        assert_eq!(FeedbackCategory::from_str("BUG"), FeedbackCategory::Bug);
        assert_eq!(FeedbackCategory::from_str("content"), FeedbackCategory::Content);
        assert_eq!(FeedbackCategory::from_str("whatever"), FeedbackCategory::Other);
    }

    #[test]
    fn test_new_feedback() {
        let fb = Feedback::new("user_1", FeedbackCategory::Suggestion, "More beaches")
            .about_trip("trip_1")
            .with_rating(4);
        assert!(fb.id.starts_with("fb_"));
        assert_eq!(fb.trip_id.as_deref(), Some("trip_1"));
        assert_eq!(fb.rating, Some(4));
    }
}
