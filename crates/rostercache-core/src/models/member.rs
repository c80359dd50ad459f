use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Membership role within a community.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Admin,
    Moderator,
    Member,
}

/// One row of a community roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct Member {
    pub id: String,
    pub username: String,
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
    #[serde(default = "default_role")]
    pub role: MemberRole,
    #[serde(rename = "joinedAt", default)]
    pub joined_at: Option<DateTime<Utc>>,
    /// Derived skill rating, absent for members without rated activity.
    #[serde(default)]
    pub rating: Option<f64>,
}

fn default_role() -> MemberRole {
    MemberRole::Member
}

impl Member {
    /// Name to show in a roster row, preferring the display name.
    pub fn name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.username)
    }
}
