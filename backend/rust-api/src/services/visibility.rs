use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::error::{EligibilityFailure, EngineError};
use crate::models::{SessionAssignment, Visibility};
use crate::storage::{GroupMembershipStore, SessionStore};

/// Decides whether a user may see or start an assignment. Checks run in a
/// fixed order (scope, window, attempts, cooldown) and the first failure
/// wins, so the UI always gets the same reason for the same state.
pub struct AssignmentVisibilityResolver {
    groups: Arc<dyn GroupMembershipStore>,
    sessions: Arc<dyn SessionStore>,
}

impl AssignmentVisibilityResolver {
    pub fn new(groups: Arc<dyn GroupMembershipStore>, sessions: Arc<dyn SessionStore>) -> Self {
        Self { groups, sessions }
    }

    pub async fn check(
        &self,
        user_id: &str,
        assignment: &SessionAssignment,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        assignment.validate().map_err(EngineError::Validation)?;

        match assignment.visibility {
            Visibility::Public => {}
            Visibility::Group => {
                let group_id = assignment.group_id.as_deref().unwrap_or_default();
                if !self.groups.is_member(group_id, user_id).await? {
                    return Err(EngineError::NotEligible(EligibilityFailure::NotInGroup));
                }
            }
            Visibility::Private => {
                if assignment.user_id.as_deref() != Some(user_id) {
                    return Err(EngineError::NotEligible(EligibilityFailure::NotAssignee));
                }
            }
        }

        if let Some(start) = assignment.window_start {
            if now < start {
                return Err(EngineError::NotEligible(EligibilityFailure::WindowNotOpen));
            }
        }
        if let Some(end) = assignment.window_end {
            if now >= end {
                return Err(EngineError::NotEligible(EligibilityFailure::WindowClosed));
            }
        }

        if let Some(max_attempts) = assignment.max_attempts {
            let attempts = self
                .sessions
                .count_completed(user_id, &assignment.id)
                .await?;
            if attempts >= max_attempts as u64 {
                return Err(EngineError::NotEligible(
                    EligibilityFailure::AttemptLimitReached,
                ));
            }
        }

        if let Some(cooldown_hours) = assignment.cooldown_hours {
            if let Some(last_finish) = self
                .sessions
                .last_completed_at(user_id, &assignment.id)
                .await?
            {
                let until = last_finish + Duration::hours(cooldown_hours);
                if now < until {
                    return Err(EngineError::NotEligible(EligibilityFailure::CooldownActive {
                        until,
                    }));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::assignment::Visibility;
    use crate::models::{Session, SessionKind, SessionStatus};
    use crate::storage::{MemoryStore, SessionStore as _};
    use uuid::Uuid;

    fn assignment(visibility: Visibility) -> SessionAssignment {
        SessionAssignment {
            id: "a1".to_string(),
            template_id: "tpl1".to_string(),
            visibility,
            group_id: matches!(visibility, Visibility::Group).then(|| "g1".to_string()),
            user_id: matches!(visibility, Visibility::Private).then(|| "u2".to_string()),
            window_start: None,
            window_end: None,
            max_attempts: None,
            cooldown_hours: None,
            certification_override: None,
        }
    }

    fn completed_session(user_id: &str, finished_at: DateTime<Utc>) -> Session {
        Session {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            assignment_id: Some("a1".to_string()),
            template_id: "tpl1".to_string(),
            kind: SessionKind::Interview,
            status: SessionStatus::Completed,
            started_at: finished_at - Duration::minutes(30),
            active_since: None,
            paused_at: None,
            submitted_at: Some(finished_at),
            finished_at: Some(finished_at),
            current_question_index: 0,
            question_ids: Vec::new(),
            time_budget_sec: None,
            certification_enabled: false,
            total_score: 0.0,
            total_time_sec: 1800,
            answers: Vec::new(),
        }
    }

    fn resolver(store: &MemoryStore) -> AssignmentVisibilityResolver {
        AssignmentVisibilityResolver::new(Arc::new(store.clone()), Arc::new(store.clone()))
    }

    #[tokio::test]
    async fn public_assignment_is_eligible() {
        let store = MemoryStore::new();
        let result = resolver(&store)
            .check("u1", &assignment(Visibility::Public), Utc::now())
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn group_assignment_requires_membership() {
        let store = MemoryStore::new();
        store.seed_group_member("g1", "member");
        let resolver = resolver(&store);
        let a = assignment(Visibility::Group);

        assert!(resolver.check("member", &a, Utc::now()).await.is_ok());
        assert!(matches!(
            resolver.check("outsider", &a, Utc::now()).await,
            Err(EngineError::NotEligible(EligibilityFailure::NotInGroup))
        ));
    }

    #[tokio::test]
    async fn private_assignment_is_visible_to_its_user_only() {
        let store = MemoryStore::new();
        let resolver = resolver(&store);
        let a = assignment(Visibility::Private);

        assert!(resolver.check("u2", &a, Utc::now()).await.is_ok());
        assert!(matches!(
            resolver.check("u1", &a, Utc::now()).await,
            Err(EngineError::NotEligible(EligibilityFailure::NotAssignee))
        ));
    }

    #[tokio::test]
    async fn window_bounds_are_half_open() {
        let store = MemoryStore::new();
        let resolver = resolver(&store);
        let now = Utc::now();
        let mut a = assignment(Visibility::Public);
        a.window_start = Some(now - Duration::hours(1));
        a.window_end = Some(now + Duration::hours(1));

        assert!(resolver.check("u1", &a, now).await.is_ok());
        assert!(matches!(
            resolver.check("u1", &a, now - Duration::hours(2)).await,
            Err(EngineError::NotEligible(EligibilityFailure::WindowNotOpen))
        ));
        // The end instant itself is already outside the window.
        assert!(matches!(
            resolver.check("u1", &a, now + Duration::hours(1)).await,
            Err(EngineError::NotEligible(EligibilityFailure::WindowClosed))
        ));
    }

    #[tokio::test]
    async fn attempt_limit_counts_completed_sessions() {
        let store = MemoryStore::new();
        store
            .update(&completed_session("u1", Utc::now() - Duration::days(1)))
            .await
            .unwrap();
        store
            .update(&completed_session("u1", Utc::now() - Duration::days(2)))
            .await
            .unwrap();

        let resolver = resolver(&store);
        let mut a = assignment(Visibility::Public);
        a.max_attempts = Some(2);

        assert!(matches!(
            resolver.check("u1", &a, Utc::now()).await,
            Err(EngineError::NotEligible(
                EligibilityFailure::AttemptLimitReached
            ))
        ));
        // A different user still has attempts left.
        assert!(resolver.check("u9", &a, Utc::now()).await.is_ok());
    }

    #[tokio::test]
    async fn cooldown_blocks_until_it_lapses() {
        let store = MemoryStore::new();
        store
            .update(&completed_session("u1", Utc::now() - Duration::hours(2)))
            .await
            .unwrap();

        let resolver = resolver(&store);
        let mut a = assignment(Visibility::Public);
        a.cooldown_hours = Some(24);

        assert!(matches!(
            resolver.check("u1", &a, Utc::now()).await,
            Err(EngineError::NotEligible(
                EligibilityFailure::CooldownActive { .. }
            ))
        ));

        a.cooldown_hours = Some(1);
        assert!(resolver.check("u1", &a, Utc::now()).await.is_ok());
    }

    #[tokio::test]
    async fn scope_failure_wins_over_window_failure() {
        let store = MemoryStore::new();
        let resolver = resolver(&store);
        let mut a = assignment(Visibility::Private);
        a.window_end = Some(Utc::now() - Duration::hours(1));

        // Both scope and window fail; the scope reason is reported.
        assert!(matches!(
            resolver.check("u1", &a, Utc::now()).await,
            Err(EngineError::NotEligible(EligibilityFailure::NotAssignee))
        ));
    }
}
