use serde::{Deserialize, Serialize};

use super::question::QuestionLevel;

/// Admin-authored configuration for a family of sessions. Read-only from the
/// engine's point of view; owned by the template store collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub kind: SessionKind,
    pub criteria: SelectionCriteria,
    pub navigation: NavigationMode,
    pub allow_pause: bool,
    pub total_time_sec: Option<u32>,
    pub per_question_sec: Option<u32>,
    /// Defaults per kind: Overwrite for practice, Reject for interview.
    pub resubmission: Option<ResubmissionPolicy>,
    /// Match threshold for written answers, percent. Default 80.
    pub written_threshold: Option<u8>,
    pub written_scoring: WrittenScoring,
    pub immediate_feedback: bool,
    pub certification_enabled: bool,
    /// Credits debited per interview start.
    pub interview_cost: u32,
    /// Interview reuse cooldown: questions the user answered in an interview
    /// within this window are excluded from selection.
    pub question_reuse_cooldown_hours: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Practice,
    Interview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationMode {
    /// Questions must be answered at the current index, in order.
    Linear,
    /// Any not-yet-answered question may be answered.
    Free,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResubmissionPolicy {
    Overwrite,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrittenScoring {
    /// Score equals match percent / 100.
    Proportional,
    /// Full point at or above threshold, zero below.
    Binary,
}

impl Template {
    pub fn effective_resubmission(&self) -> ResubmissionPolicy {
        self.resubmission.unwrap_or(match self.kind {
            SessionKind::Practice => ResubmissionPolicy::Overwrite,
            SessionKind::Interview => ResubmissionPolicy::Reject,
        })
    }

    pub fn effective_written_threshold(&self, default_threshold: u8) -> u8 {
        self.written_threshold.unwrap_or(default_threshold)
    }

    /// Session time budget in seconds, if the template defines any timer.
    /// Per-question budgets are enforced in aggregate under lazy expiry.
    pub fn time_budget_sec(&self, question_count: usize) -> Option<u32> {
        self.total_time_sec
            .or_else(|| self.per_question_sec.map(|s| s * question_count as u32))
    }
}

/// How many questions of each type a session draws, and from where.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionCriteria {
    pub topic_ids: Vec<String>,
    pub levels: Vec<QuestionLevel>,
    pub count_single: u32,
    pub count_multi: u32,
    pub count_written: u32,
}

impl SelectionCriteria {
    pub fn total_count(&self) -> u32 {
        self.count_single + self.count_multi + self.count_written
    }

    /// Topic set must be non-empty when any questions are requested.
    pub fn validate(&self) -> Result<(), String> {
        if self.total_count() > 0 && self.topic_ids.is_empty() {
            return Err("selection criteria request questions but name no topics".to_string());
        }
        Ok(())
    }
}

/// Per-bucket shortage reported when a bucket holds fewer eligible
/// questions than requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortfall {
    pub single: u32,
    pub multi: u32,
    pub written: u32,
}

impl Shortfall {
    pub fn is_zero(&self) -> bool {
        self.single == 0 && self.multi == 0 && self.written == 0
    }
}
