use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A scoped offer of a template: to everyone, to a group, or to one user,
/// optionally bounded by a time window and attempt limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionAssignment {
    pub id: String,
    pub template_id: String,
    pub visibility: Visibility,
    pub group_id: Option<String>,
    pub user_id: Option<String>,
    /// Window is half-open: eligible while window_start <= now < window_end.
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
    pub max_attempts: Option<u32>,
    pub cooldown_hours: Option<i64>,
    /// Overrides the template's certification flag when set.
    pub certification_override: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Group,
    Private,
}

impl SessionAssignment {
    /// Group visibility requires a group id; Private requires a user id.
    pub fn validate(&self) -> Result<(), String> {
        match self.visibility {
            Visibility::Group if self.group_id.is_none() => {
                Err("group-scoped assignment is missing group_id".to_string())
            }
            Visibility::Private if self.user_id.is_none() => {
                Err("private assignment is missing user_id".to_string())
            }
            _ => Ok(()),
        }
    }
}
