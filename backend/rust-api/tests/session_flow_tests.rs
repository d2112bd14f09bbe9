use axum::http::StatusCode;
use serde_json::json;

mod common;

#[tokio::test]
async fn practice_session_runs_start_to_finish() {
    let (app, _store) = common::create_test_app();

    let (status, session) = common::post_json(
        &app,
        "/api/v1/sessions/",
        json!({ "user_id": "user-1", "template_id": "tpl-practice" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "start failed: {}", session);
    assert_eq!(session["status"], "in_progress");
    assert_eq!(session["current_question_index"], 0);

    let session_id = session["id"].as_str().unwrap().to_string();
    let question_ids: Vec<String> = session["question_ids"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert_eq!(question_ids.len(), 3);

    // Questions come back without correctness flags or official answers.
    let first_question = &session["questions"][0];
    assert!(first_question.get("official_answer").is_none());
    assert!(first_question["options"]
        .as_array()
        .map(|options| options.iter().all(|o| o.get("is_correct").is_none()))
        .unwrap_or(true));

    // Answer every question; the practice template gives immediate feedback.
    for question_id in &question_ids {
        let body = if question_id.starts_with("written") {
            json!({
                "question_id": question_id,
                "given_text": "closures capture variables from the enclosing scope",
                "time_spent_sec": 30,
            })
        } else {
            let option = format!(
                "{}-right",
                if question_id == "single-1" { "s1" } else { "s2" }
            );
            json!({
                "question_id": question_id,
                "selected_option_ids": [option],
                "time_spent_sec": 10,
            })
        };

        let (status, answer) = common::post_json(
            &app,
            &format!("/api/v1/sessions/{}/answers", session_id),
            body,
        )
        .await;
        assert_eq!(status, StatusCode::OK, "answer failed: {}", answer);
        assert_eq!(answer["is_correct"], true);
    }

    let (status, finished) = common::post_json(
        &app,
        &format!("/api/v1/sessions/{}/finish", session_id),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(finished["status"], "completed");
    // Two correct choices plus a written answer at or above the threshold.
    assert!(finished["total_score"].as_f64().unwrap() > 2.5);

    let (status, fetched) = common::get_json(&app, &format!("/api/v1/sessions/{}", session_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["status"], "completed");
}

#[tokio::test]
async fn start_requires_an_assignment_or_template() {
    let (app, _store) = common::create_test_app();

    let (status, _) =
        common::post_json(&app, "/api/v1/sessions/", json!({ "user_id": "user-1" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = common::post_json(
        &app,
        "/api/v1/sessions/",
        json!({ "user_id": "", "template_id": "tpl-practice" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_template_is_not_found() {
    let (app, _store) = common::create_test_app();

    let (status, _) = common::post_json(
        &app,
        "/api/v1/sessions/",
        json!({ "user_id": "user-1", "template_id": "missing" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn interview_without_credits_is_rejected_without_side_effects() {
    let (app, store) = common::create_test_app();

    let (status, body) = common::post_json(
        &app,
        "/api/v1/sessions/",
        json!({ "user_id": "user-1", "assignment_id": "assign-public" }),
    )
    .await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED, "body: {}", body);
    assert!(store.ledger_entries("user-1").is_empty());

    let (_, balance) = common::get_json(&app, "/api/v1/credits/user-1").await;
    assert_eq!(balance["available_credits"], 0);
}

#[tokio::test]
async fn private_assignment_is_forbidden_for_other_users() {
    let (app, _store) = common::create_test_app();

    let (status, body) = common::post_json(
        &app,
        "/api/v1/sessions/",
        json!({ "user_id": "user-1", "assignment_id": "assign-private" }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.as_str().unwrap_or_default().contains("private"));
}

#[tokio::test]
async fn completed_session_rejects_further_answers() {
    let (app, _store) = common::create_test_app();

    let (_, session) = common::post_json(
        &app,
        "/api/v1/sessions/",
        json!({ "user_id": "user-1", "template_id": "tpl-practice" }),
    )
    .await;
    let session_id = session["id"].as_str().unwrap();

    let (status, _) = common::post_json(
        &app,
        &format!("/api/v1/sessions/{}/finish", session_id),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = common::post_json(
        &app,
        &format!("/api/v1/sessions/{}/answers", session_id),
        json!({
            "question_id": "single-1",
            "selected_option_ids": ["s1-right"],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn pause_and_resume_round_trip() {
    let (app, _store) = common::create_test_app();

    let (_, session) = common::post_json(
        &app,
        "/api/v1/sessions/",
        json!({ "user_id": "user-1", "template_id": "tpl-practice" }),
    )
    .await;
    let session_id = session["id"].as_str().unwrap();

    let (status, paused) = common::post_json(
        &app,
        &format!("/api/v1/sessions/{}/pause", session_id),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paused["status"], "paused");

    // A paused session cannot be finished directly.
    let (status, _) = common::post_json(
        &app,
        &format!("/api/v1/sessions/{}/finish", session_id),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, resumed) = common::post_json(
        &app,
        &format!("/api/v1/sessions/{}/resume", session_id),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resumed["status"], "in_progress");
}

#[tokio::test]
async fn retake_creates_a_fresh_session_after_completion() {
    let (app, _store) = common::create_test_app();

    let (_, session) = common::post_json(
        &app,
        "/api/v1/sessions/",
        json!({ "user_id": "user-1", "template_id": "tpl-practice" }),
    )
    .await;
    let session_id = session["id"].as_str().unwrap().to_string();

    let (status, _) = common::post_json(
        &app,
        &format!("/api/v1/sessions/{}/retake", session_id),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "retake of a running session");

    common::post_json(
        &app,
        &format!("/api/v1/sessions/{}/finish", session_id),
        json!({}),
    )
    .await;

    let (status, fresh) = common::post_json(
        &app,
        &format!("/api/v1/sessions/{}/retake", session_id),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_ne!(fresh["id"].as_str().unwrap(), session_id);
    assert_eq!(fresh["status"], "in_progress");
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let (app, _store) = common::create_test_app();
    let (status, _) = common::get_json(&app, "/api/v1/sessions/no-such-session").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
