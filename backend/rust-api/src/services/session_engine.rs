use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::EngineError;
use crate::metrics::{
    ANSWERS_SUBMITTED_TOTAL, CERTIFICATE_SIGNALS_TOTAL, SESSIONS_ACTIVE, SESSIONS_TOTAL,
};
use crate::models::{
    Answer, NavigationMode, Question, QuestionKind, ResubmissionPolicy, Session, SessionAssignment,
    SessionKind, SessionResponse, SessionStatus, Shortfall, StartSessionRequest,
    SubmitAnswerRequest, SubmitAnswerResponse, Template, TransactionKind,
};
use crate::storage::{
    AssignmentStore, CertificateIssuer, InsertOutcome, QuestionPoolProvider, SessionStore,
};

use super::credit_ledger::CreditLedgerService;
use super::evaluator;
use super::question_selector::QuestionSelector;
use super::visibility::AssignmentVisibilityResolver;
use super::AppState;

/// Drives a session through its lifecycle. The engine is request-driven:
/// every transition, including timer expiry, happens synchronously inside
/// the call that observes it. There is no background scheduler.
///
/// Legal transitions: InProgress -> {Paused, Completed, Expired,
/// Abandoned}; Paused -> InProgress. Everything else is rejected.
pub struct SessionEngine {
    questions: Arc<dyn QuestionPoolProvider>,
    assignments: Arc<dyn AssignmentStore>,
    sessions: Arc<dyn SessionStore>,
    certificates: Arc<dyn CertificateIssuer>,
    credits: Arc<CreditLedgerService>,
    selector: QuestionSelector,
    resolver: AssignmentVisibilityResolver,
    written_threshold_default: u8,
}

impl SessionEngine {
    pub fn from_state(state: &AppState) -> Self {
        Self {
            questions: state.questions.clone(),
            assignments: state.assignments.clone(),
            sessions: state.sessions.clone(),
            certificates: state.certificates.clone(),
            credits: state.credits.clone(),
            selector: QuestionSelector::new(state.questions.clone()),
            resolver: AssignmentVisibilityResolver::new(
                state.groups.clone(),
                state.sessions.clone(),
            ),
            written_threshold_default: state.config.written_match_threshold,
        }
    }

    pub async fn start(&self, req: &StartSessionRequest) -> Result<SessionResponse, EngineError> {
        let now = Utc::now();
        match (&req.assignment_id, &req.template_id) {
            (Some(assignment_id), _) => {
                self.start_assigned(&req.user_id, assignment_id, now).await
            }
            (None, Some(template_id)) => self.start_adhoc(&req.user_id, template_id, now).await,
            (None, None) => Err(EngineError::Validation(
                "either assignment_id or template_id is required".to_string(),
            )),
        }
    }

    /// Ad-hoc practice straight from a template: no visibility rules, no
    /// credits, no certification.
    async fn start_adhoc(
        &self,
        user_id: &str,
        template_id: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionResponse, EngineError> {
        let template = self.template(template_id).await?;
        if template.kind != SessionKind::Practice {
            return Err(EngineError::Validation(
                "interview sessions require an assignment".to_string(),
            ));
        }
        self.create_session(user_id, None, &template, false, now)
            .await
    }

    async fn start_assigned(
        &self,
        user_id: &str,
        assignment_id: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionResponse, EngineError> {
        let assignment = self
            .assignments
            .assignment(assignment_id)
            .await?
            .ok_or(EngineError::NotFound("assignment"))?;
        let template = self.template(&assignment.template_id).await?;
        self.resolver.check(user_id, &assignment, now).await?;

        // A still-running session for the same assignment is resumed, not
        // duplicated.
        if let Some(mut existing) = self.sessions.find_active(user_id, assignment_id).await? {
            if !self.expire_if_due(&mut existing, now).await? {
                tracing::info!(
                    "Start request for user {} resumed active session {}",
                    user_id,
                    existing.id
                );
                return self.response_for(existing, None).await;
            }
            // The stale run just expired and now counts as an attempt.
            self.resolver.check(user_id, &assignment, now).await?;
        }

        let certification = assignment
            .certification_override
            .unwrap_or(template.certification_enabled);
        self.create_session(user_id, Some(assignment), &template, certification, now)
            .await
    }

    async fn create_session(
        &self,
        user_id: &str,
        assignment: Option<SessionAssignment>,
        template: &Template,
        certification: bool,
        now: DateTime<Utc>,
    ) -> Result<SessionResponse, EngineError> {
        let session_id = Uuid::new_v4().to_string();
        let is_interview = template.kind == SessionKind::Interview;

        // Interviews debit exactly once, before question generation. The
        // debit stays consumed if the session is later abandoned, but a
        // failed creation below refunds it.
        let mut debited = 0u32;
        if is_interview && template.interview_cost > 0 {
            self.credits
                .consume(
                    user_id,
                    template.interview_cost,
                    &session_id,
                    &format!("Interview session for template '{}'", template.name),
                )
                .await?;
            debited = template.interview_cost;
        }

        match self
            .generate_and_insert(user_id, &session_id, assignment, template, certification, now)
            .await
        {
            Ok(response) => Ok(response),
            Err(err) => {
                if debited > 0 {
                    self.credits
                        .add_entry(
                            user_id,
                            TransactionKind::Refund,
                            debited as i64,
                            "Interview session creation failed",
                            Some(session_id),
                            None,
                        )
                        .await?;
                }
                Err(err)
            }
        }
    }

    async fn generate_and_insert(
        &self,
        user_id: &str,
        session_id: &str,
        assignment: Option<SessionAssignment>,
        template: &Template,
        certification: bool,
        now: DateTime<Utc>,
    ) -> Result<SessionResponse, EngineError> {
        let is_interview = template.kind == SessionKind::Interview;

        let exclude_ids = match (is_interview, template.question_reuse_cooldown_hours) {
            (true, Some(hours)) => {
                self.sessions
                    .recently_answered_question_ids(user_id, now - Duration::hours(hours))
                    .await?
            }
            _ => Vec::new(),
        };

        let outcome = self.selector.select(&template.criteria, &exclude_ids).await?;

        let session = Session {
            id: session_id.to_string(),
            user_id: user_id.to_string(),
            assignment_id: assignment.as_ref().map(|a| a.id.clone()),
            template_id: template.id.clone(),
            kind: template.kind,
            status: SessionStatus::InProgress,
            started_at: now,
            active_since: Some(now),
            paused_at: None,
            submitted_at: None,
            finished_at: None,
            current_question_index: 0,
            question_ids: outcome.questions.iter().map(|q| q.id.clone()).collect(),
            time_budget_sec: template.time_budget_sec(outcome.questions.len()),
            certification_enabled: is_interview && certification,
            total_score: 0.0,
            total_time_sec: 0,
            answers: Vec::new(),
        };

        match self.sessions.insert_active_exclusive(&session).await? {
            InsertOutcome::Inserted => {
                SESSIONS_TOTAL.with_label_values(&["created"]).inc();
                SESSIONS_ACTIVE.inc();
                tracing::info!(
                    "Session {} created for user {} ({} questions)",
                    session.id,
                    user_id,
                    session.question_ids.len()
                );
                let shortfall = (!outcome.shortfall.is_zero()).then_some(outcome.shortfall);
                Ok(SessionResponse {
                    questions: outcome.questions.iter().map(Into::into).collect(),
                    session,
                    shortfall,
                })
            }
            InsertOutcome::ActiveExists(existing) => {
                // Lost a concurrent start race; hand back the winner and
                // give the debit back.
                if is_interview && template.interview_cost > 0 {
                    self.credits
                        .add_entry(
                            user_id,
                            TransactionKind::Refund,
                            template.interview_cost as i64,
                            "Duplicate interview start",
                            Some(existing.id.clone()),
                            None,
                        )
                        .await?;
                }
                self.response_for(existing, None).await
            }
        }
    }

    pub async fn get_session(&self, session_id: &str) -> Result<SessionResponse, EngineError> {
        let mut session = self.load(session_id).await?;
        // A finalized-on-read session is still the natural result here.
        self.expire_if_due(&mut session, Utc::now()).await?;
        self.response_for(session, None).await
    }

    pub async fn submit_answer(
        &self,
        session_id: &str,
        req: &SubmitAnswerRequest,
    ) -> Result<SubmitAnswerResponse, EngineError> {
        let now = Utc::now();
        let mut session = self.load(session_id).await?;
        if self.expire_if_due(&mut session, now).await? {
            return Err(EngineError::SessionExpired {
                session_id: session.id,
            });
        }
        if session.status != SessionStatus::InProgress {
            return Err(EngineError::InvalidStateTransition {
                from: session.status,
                operation: "submit_answer".to_string(),
            });
        }

        let template = self.template(&session.template_id).await?;
        let position = session
            .question_ids
            .iter()
            .position(|q| q == &req.question_id)
            .ok_or(EngineError::NotFound("question"))?;

        // Optimistic staleness check: a linear session only accepts the
        // question the cursor points at.
        if template.navigation == NavigationMode::Linear
            && position != session.current_question_index
        {
            return Err(EngineError::InvalidStateTransition {
                from: session.status,
                operation: format!(
                    "submit_answer for question {} while the current index is {}",
                    position, session.current_question_index
                ),
            });
        }

        let existing = session
            .answers
            .iter()
            .position(|a| a.question_id == req.question_id);
        if existing.is_some()
            && template.effective_resubmission() == ResubmissionPolicy::Reject
        {
            return Err(EngineError::AnswerAlreadyRecorded {
                question_id: req.question_id.clone(),
            });
        }

        let question = self
            .questions
            .questions_by_ids(std::slice::from_ref(&req.question_id))
            .await?
            .into_iter()
            .next()
            .ok_or(EngineError::NotFound("question"))?;

        let answer = self.grade(&question, req, &template, now);
        let correct_label = if answer.is_correct == Some(true) {
            "true"
        } else {
            "false"
        };
        ANSWERS_SUBMITTED_TOTAL
            .with_label_values(&[correct_label])
            .inc();

        let graded = answer.clone();
        match existing {
            Some(index) => session.answers[index] = answer,
            None => session.answers.push(answer),
        }
        session.current_question_index = session.first_unanswered_index();
        self.sessions.update(&session).await?;

        let answered_count = session.answers.len();
        let (is_correct, match_percentage) = if template.immediate_feedback {
            (graded.is_correct, graded.match_percentage)
        } else {
            (None, None)
        };
        Ok(SubmitAnswerResponse {
            question_id: req.question_id.clone(),
            is_correct,
            match_percentage,
            answered_count,
            remaining_count: session.question_ids.len().saturating_sub(answered_count),
            current_question_index: session.current_question_index,
        })
    }

    pub async fn pause(&self, session_id: &str) -> Result<SessionResponse, EngineError> {
        let now = Utc::now();
        let mut session = self.load(session_id).await?;
        if self.expire_if_due(&mut session, now).await? {
            return Err(EngineError::SessionExpired {
                session_id: session.id,
            });
        }
        if session.status != SessionStatus::InProgress {
            return Err(EngineError::InvalidStateTransition {
                from: session.status,
                operation: "pause".to_string(),
            });
        }
        let template = self.template(&session.template_id).await?;
        if !template.allow_pause {
            return Err(EngineError::Validation(
                "template does not allow pausing".to_string(),
            ));
        }

        // Freeze time accumulation by folding the running segment.
        session.total_time_sec = session.elapsed_sec(now);
        session.active_since = None;
        session.paused_at = Some(now);
        session.status = SessionStatus::Paused;
        self.sessions.update(&session).await?;
        self.response_for(session, None).await
    }

    pub async fn resume(&self, session_id: &str) -> Result<SessionResponse, EngineError> {
        let now = Utc::now();
        let mut session = self.load(session_id).await?;
        if session.status != SessionStatus::Paused {
            return Err(EngineError::InvalidStateTransition {
                from: session.status,
                operation: "resume".to_string(),
            });
        }

        session.status = SessionStatus::InProgress;
        session.active_since = Some(now);
        session.paused_at = None;
        self.sessions.update(&session).await?;
        self.response_for(session, None).await
    }

    /// Finalizes the session: sums per-answer scores and, for
    /// certification-enabled interviews, signals the certificate issuer.
    /// The signal is one-way: a failing issuer is logged, never surfaced.
    pub async fn finish(&self, session_id: &str) -> Result<SessionResponse, EngineError> {
        let now = Utc::now();
        let mut session = self.load(session_id).await?;
        if self.expire_if_due(&mut session, now).await? {
            return Err(EngineError::SessionExpired {
                session_id: session.id,
            });
        }
        if session.status != SessionStatus::InProgress {
            return Err(EngineError::InvalidStateTransition {
                from: session.status,
                operation: "finish".to_string(),
            });
        }

        session.total_time_sec = session.elapsed_sec(now);
        session.active_since = None;
        session.status = SessionStatus::Completed;
        session.submitted_at = Some(now);
        session.finished_at = Some(now);
        session.total_score = session.answers.iter().map(|a| a.score).sum();
        self.sessions.update(&session).await?;

        SESSIONS_TOTAL.with_label_values(&["completed"]).inc();
        SESSIONS_ACTIVE.dec();
        tracing::info!(
            "Session {} completed: score {:.2} over {} answers",
            session.id,
            session.total_score,
            session.answers.len()
        );

        if session.kind == SessionKind::Interview && session.certification_enabled {
            match self
                .certificates
                .signal_eligibility(&session.id, &session.user_id, session.total_score)
                .await
            {
                Ok(()) => CERTIFICATE_SIGNALS_TOTAL.inc(),
                Err(e) => tracing::error!(
                    "Certificate signal for session {} failed: {:#}",
                    session.id,
                    e
                ),
            }
        }

        self.response_for(session, None).await
    }

    /// Starts a fresh run of the same assignment (or ad-hoc template).
    /// Only legal once the previous run is terminal, and subject to the
    /// same visibility rules as any start.
    pub async fn retake(&self, session_id: &str) -> Result<SessionResponse, EngineError> {
        let mut session = self.load(session_id).await?;
        self.expire_if_due(&mut session, Utc::now()).await?;
        if !session.status.is_terminal() {
            return Err(EngineError::InvalidStateTransition {
                from: session.status,
                operation: "retake".to_string(),
            });
        }

        let req = StartSessionRequest {
            user_id: session.user_id.clone(),
            assignment_id: session.assignment_id.clone(),
            template_id: session
                .assignment_id
                .is_none()
                .then(|| session.template_id.clone()),
        };
        self.start(&req).await
    }

    /// Lazy timer expiry: finalizes an over-budget running session to
    /// Expired, scoring the answers submitted so far. Paused sessions are
    /// frozen and cannot expire.
    async fn expire_if_due(
        &self,
        session: &mut Session,
        now: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        if session.status != SessionStatus::InProgress {
            return Ok(false);
        }
        let Some(budget) = session.time_budget_sec else {
            return Ok(false);
        };
        if session.elapsed_sec(now) < budget {
            return Ok(false);
        }

        session.total_time_sec = budget;
        session.active_since = None;
        session.status = SessionStatus::Expired;
        session.finished_at = Some(now);
        session.total_score = session.answers.iter().map(|a| a.score).sum();
        self.sessions.update(session).await?;

        SESSIONS_TOTAL.with_label_values(&["expired"]).inc();
        SESSIONS_ACTIVE.dec();
        tracing::info!(
            "Session {} expired after its {}s budget; {} answers kept",
            session.id,
            budget,
            session.answers.len()
        );
        Ok(true)
    }

    fn grade(
        &self,
        question: &Question,
        req: &SubmitAnswerRequest,
        template: &Template,
        now: DateTime<Utc>,
    ) -> Answer {
        let mut answer = Answer {
            question_id: question.id.clone(),
            selected_option_ids: Vec::new(),
            given_text: None,
            is_correct: None,
            score: 0.0,
            match_percentage: None,
            time_spent_sec: req.time_spent_sec,
            answered_at: now,
        };

        match question.kind {
            QuestionKind::SingleChoice => {
                let correct = evaluator::evaluate_single_choice(question, &req.selected_option_ids);
                answer.selected_option_ids = req.selected_option_ids.clone();
                answer.is_correct = Some(correct);
                answer.score = if correct { 1.0 } else { 0.0 };
            }
            QuestionKind::MultiChoice => {
                let correct = evaluator::evaluate_multi_choice(question, &req.selected_option_ids);
                answer.selected_option_ids = req.selected_option_ids.clone();
                answer.is_correct = Some(correct);
                answer.score = if correct { 1.0 } else { 0.0 };
            }
            QuestionKind::Written => {
                let text = req.given_text.clone().unwrap_or_default();
                let threshold = template.effective_written_threshold(self.written_threshold_default);
                let (percent, correct) = evaluator::evaluate_written(question, &text, threshold);
                answer.given_text = Some(text);
                answer.is_correct = Some(correct);
                answer.match_percentage = Some(percent);
                answer.score = match template.written_scoring {
                    crate::models::template::WrittenScoring::Proportional => percent / 100.0,
                    crate::models::template::WrittenScoring::Binary => {
                        if correct {
                            1.0
                        } else {
                            0.0
                        }
                    }
                };
            }
        }
        answer
    }

    async fn response_for(
        &self,
        session: Session,
        shortfall: Option<Shortfall>,
    ) -> Result<SessionResponse, EngineError> {
        let fetched = self
            .questions
            .questions_by_ids(&session.question_ids)
            .await?;
        let mut by_id: HashMap<&str, &Question> =
            fetched.iter().map(|q| (q.id.as_str(), q)).collect();
        let questions = session
            .question_ids
            .iter()
            .filter_map(|id| by_id.remove(id.as_str()))
            .map(Into::into)
            .collect();
        Ok(SessionResponse {
            session,
            questions,
            shortfall,
        })
    }

    async fn load(&self, session_id: &str) -> Result<Session, EngineError> {
        self.sessions
            .find(session_id)
            .await?
            .ok_or(EngineError::NotFound("session"))
    }

    async fn template(&self, template_id: &str) -> Result<Template, EngineError> {
        self.assignments
            .template(template_id)
            .await?
            .ok_or(EngineError::NotFound("template"))
    }
}
