use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// One recorded answer, embedded in its session document. Created once per
/// question; overwritten only where the template's resubmission policy
/// allows it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: String,
    /// Choice questions only.
    pub selected_option_ids: Vec<String>,
    /// Written questions only.
    pub given_text: Option<String>,
    pub is_correct: Option<bool>,
    pub score: f64,
    /// Written questions only.
    pub match_percentage: Option<f64>,
    pub time_spent_sec: u32,
    pub answered_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitAnswerRequest {
    #[validate(length(min = 1))]
    pub question_id: String,
    #[serde(default)]
    pub selected_option_ids: Vec<String>,
    pub given_text: Option<String>,
    #[serde(default)]
    pub time_spent_sec: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitAnswerResponse {
    pub question_id: String,
    /// Correctness is withheld unless the template enables immediate
    /// feedback.
    pub is_correct: Option<bool>,
    pub match_percentage: Option<f64>,
    pub answered_count: usize,
    pub remaining_count: usize,
    pub current_question_index: usize,
}
