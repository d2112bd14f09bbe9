use std::sync::Arc;

use rand::seq::IndexedRandom;

use crate::error::EngineError;
use crate::models::{Question, QuestionKind, SelectionCriteria, Shortfall};
use crate::storage::QuestionPoolProvider;

/// Builds the ordered question set for one session from a template's
/// selection criteria. Each draw is uniform without replacement; a
/// regeneration is an independent new draw.
pub struct QuestionSelector {
    pool: Arc<dyn QuestionPoolProvider>,
}

#[derive(Debug)]
pub struct SelectionOutcome {
    pub questions: Vec<Question>,
    pub shortfall: Shortfall,
}

impl QuestionSelector {
    pub fn new(pool: Arc<dyn QuestionPoolProvider>) -> Self {
        Self { pool }
    }

    /// Draws per-type buckets and concatenates them (single, multi,
    /// written). Buckets short of questions select everything available
    /// and report the gap; the caller decides whether a short session is
    /// acceptable. Zero eligible questions overall is fatal.
    pub async fn select(
        &self,
        criteria: &SelectionCriteria,
        exclude_ids: &[String],
    ) -> Result<SelectionOutcome, EngineError> {
        criteria.validate().map_err(EngineError::Validation)?;

        let (single_pool, multi_pool, written_pool) = futures::try_join!(
            self.bucket(criteria, QuestionKind::SingleChoice, exclude_ids),
            self.bucket(criteria, QuestionKind::MultiChoice, exclude_ids),
            self.bucket(criteria, QuestionKind::Written, exclude_ids),
        )?;

        let mut questions = Vec::with_capacity(criteria.total_count() as usize);
        let mut shortfall = Shortfall::default();

        shortfall.single = draw_into(&mut questions, single_pool, criteria.count_single);
        shortfall.multi = draw_into(&mut questions, multi_pool, criteria.count_multi);
        shortfall.written = draw_into(&mut questions, written_pool, criteria.count_written);

        if questions.is_empty() && criteria.total_count() > 0 {
            return Err(EngineError::InsufficientQuestionPool { shortfall });
        }

        if !shortfall.is_zero() {
            tracing::warn!(
                "Question pool short of criteria: single -{}, multi -{}, written -{}",
                shortfall.single,
                shortfall.multi,
                shortfall.written
            );
        }

        Ok(SelectionOutcome {
            questions,
            shortfall,
        })
    }

    async fn bucket(
        &self,
        criteria: &SelectionCriteria,
        kind: QuestionKind,
        exclude_ids: &[String],
    ) -> Result<Vec<Question>, EngineError> {
        let count = match kind {
            QuestionKind::SingleChoice => criteria.count_single,
            QuestionKind::MultiChoice => criteria.count_multi,
            QuestionKind::Written => criteria.count_written,
        };
        if count == 0 {
            return Ok(Vec::new());
        }
        let pool = self
            .pool
            .eligible_questions(&criteria.topic_ids, &criteria.levels, kind, exclude_ids)
            .await?;
        Ok(pool)
    }
}

/// Draws up to `requested` questions from the bucket uniformly without
/// replacement; returns the shortfall.
fn draw_into(out: &mut Vec<Question>, bucket: Vec<Question>, requested: u32) -> u32 {
    if requested == 0 {
        return 0;
    }
    let available = bucket.len() as u32;
    let mut rng = rand::rng();
    let drawn: Vec<Question> = bucket
        .choose_multiple(&mut rng, requested as usize)
        .cloned()
        .collect();
    out.extend(drawn);
    requested.saturating_sub(available)
}
