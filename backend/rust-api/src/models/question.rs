use serde::{Deserialize, Serialize};

/// A question as owned by the question-bank collaborator. Immutable for the
/// lifetime of any session that references it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub topic_id: String,
    pub kind: QuestionKind,
    pub level: QuestionLevel,
    pub text: String,
    /// Reference answer for written questions. Absent on choice questions.
    pub official_answer: Option<String>,
    pub options: Vec<QuestionOption>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    SingleChoice,
    MultiChoice,
    Written,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionLevel {
    Basic,
    Intermediate,
    Advanced,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: String,
    pub text: String,
    pub is_correct: bool,
}

impl Question {
    pub fn correct_option_ids(&self) -> Vec<&str> {
        self.options
            .iter()
            .filter(|o| o.is_correct)
            .map(|o| o.id.as_str())
            .collect()
    }
}

/// Question shape exposed to session participants: no correctness flags,
/// no official answer.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionView {
    pub id: String,
    pub topic_id: String,
    pub kind: QuestionKind,
    pub level: QuestionLevel,
    pub text: String,
    pub options: Vec<QuestionOptionView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionOptionView {
    pub id: String,
    pub text: String,
}

impl From<&Question> for QuestionView {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id.clone(),
            topic_id: q.topic_id.clone(),
            kind: q.kind,
            level: q.level,
            text: q.text.clone(),
            options: q
                .options
                .iter()
                .map(|o| QuestionOptionView {
                    id: o.id.clone(),
                    text: o.text.clone(),
                })
                .collect(),
        }
    }
}
