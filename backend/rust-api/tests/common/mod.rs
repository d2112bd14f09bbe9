#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use std::sync::Arc;
use tower::ServiceExt;

use prepdeck_api::models::question::{Question, QuestionKind, QuestionLevel, QuestionOption};
use prepdeck_api::models::template::{
    NavigationMode, SelectionCriteria, SessionKind, Template, WrittenScoring,
};
use prepdeck_api::models::{SessionAssignment, Visibility};
use prepdeck_api::storage::MemoryStore;
use prepdeck_api::{config::Config, create_router, services::AppState};

/// Router over the in-memory backend, plus the backend handle for seeding
/// and inspection.
pub fn create_test_app() -> (Router, MemoryStore) {
    // Initialize tracing for tests
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let (state, store) = AppState::in_memory(Config::for_tests());
    seed_question_bank(&store);
    (create_router(Arc::new(state)), store)
}

fn seed_question_bank(store: &MemoryStore) {
    store.seed_question(single_choice("single-1", "rust", "s1"));
    store.seed_question(single_choice("single-2", "rust", "s2"));
    store.seed_question(Question {
        id: "written-1".to_string(),
        topic_id: "rust".to_string(),
        kind: QuestionKind::Written,
        level: QuestionLevel::Basic,
        text: "What does a closure capture?".to_string(),
        official_answer: Some("A closure captures variables from its enclosing scope".to_string()),
        options: Vec::new(),
    });

    store.seed_template(practice_template());
    store.seed_template(interview_template());

    store.seed_assignment(SessionAssignment {
        id: "assign-public".to_string(),
        template_id: "tpl-interview".to_string(),
        visibility: Visibility::Public,
        group_id: None,
        user_id: None,
        window_start: None,
        window_end: None,
        max_attempts: None,
        cooldown_hours: None,
        certification_override: None,
    });
    store.seed_assignment(SessionAssignment {
        id: "assign-private".to_string(),
        template_id: "tpl-interview".to_string(),
        visibility: Visibility::Private,
        group_id: None,
        user_id: Some("user-2".to_string()),
        window_start: None,
        window_end: None,
        max_attempts: None,
        cooldown_hours: None,
        certification_override: None,
    });
}

fn single_choice(id: &str, topic: &str, option_prefix: &str) -> Question {
    Question {
        id: id.to_string(),
        topic_id: topic.to_string(),
        kind: QuestionKind::SingleChoice,
        level: QuestionLevel::Basic,
        text: format!("Question {}", id),
        official_answer: None,
        options: vec![
            QuestionOption {
                id: format!("{}-right", option_prefix),
                text: "right".to_string(),
                is_correct: true,
            },
            QuestionOption {
                id: format!("{}-wrong", option_prefix),
                text: "wrong".to_string(),
                is_correct: false,
            },
        ],
    }
}

fn practice_template() -> Template {
    Template {
        id: "tpl-practice".to_string(),
        name: "Rust practice".to_string(),
        kind: SessionKind::Practice,
        criteria: SelectionCriteria {
            topic_ids: vec!["rust".to_string()],
            levels: vec![QuestionLevel::Basic],
            count_single: 2,
            count_multi: 0,
            count_written: 1,
        },
        navigation: NavigationMode::Free,
        allow_pause: true,
        total_time_sec: None,
        per_question_sec: None,
        resubmission: None,
        written_threshold: None,
        written_scoring: WrittenScoring::Proportional,
        immediate_feedback: true,
        certification_enabled: false,
        interview_cost: 0,
        question_reuse_cooldown_hours: None,
    }
}

fn interview_template() -> Template {
    Template {
        id: "tpl-interview".to_string(),
        name: "Rust interview".to_string(),
        kind: SessionKind::Interview,
        criteria: SelectionCriteria {
            topic_ids: vec!["rust".to_string()],
            levels: vec![QuestionLevel::Basic],
            count_single: 2,
            count_multi: 0,
            count_written: 1,
        },
        navigation: NavigationMode::Free,
        allow_pause: false,
        total_time_sec: Some(1800),
        per_question_sec: None,
        resubmission: None,
        written_threshold: Some(80),
        written_scoring: WrittenScoring::Proportional,
        immediate_feedback: false,
        certification_enabled: true,
        interview_cost: 1,
        question_reuse_cooldown_hours: None,
    }
}

pub async fn post_json(
    app: &Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| serde_json::json!(String::from_utf8_lossy(&bytes)));
    (status, json)
}

pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| serde_json::json!(String::from_utf8_lossy(&bytes)));
    (status, json)
}
