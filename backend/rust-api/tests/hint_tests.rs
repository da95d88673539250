mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{create_test_app, register_problem, request_hint, send, unique_user};

#[tokio::test]
async fn test_hint_ladder_advances_one_level_at_a_time() {
    let app = create_test_app();
    let problem_id = register_problem(&app.router, &["arrays", "hash-tables"]).await;
    let user_id = unique_user();

    let (status, body) = request_hint(&app.router, &user_id, &problem_id, json!({})).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["hint"]["level"], 1);
    assert_eq!(body["hint"]["kind"], "clarifying");
    assert_eq!(body["unlocked_level"], 1);
    assert_eq!(body["total_levels"], 4);
    assert_eq!(body["next_available"], true);
    assert_eq!(body["replayed"], false);

    let (status, body) = request_hint(&app.router, &user_id, &problem_id, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hint"]["level"], 2);
    assert!(body["hint"]["text"]
        .as_str()
        .unwrap()
        .contains("after 1 earlier hints"));
    assert_eq!(app.generator.calls(), 2);
}

#[tokio::test]
async fn test_replay_is_identical_and_free() {
    let app = create_test_app();
    let problem_id = register_problem(&app.router, &["arrays"]).await;
    let user_id = unique_user();

    let (_, first) = request_hint(&app.router, &user_id, &problem_id, json!({})).await;
    let calls = app.generator.calls();

    let (status, replay) =
        request_hint(&app.router, &user_id, &problem_id, json!({ "level": 1 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replay["replayed"], true);
    assert_eq!(replay["hint"], first["hint"]);
    assert_eq!(app.generator.calls(), calls);
}

#[tokio::test]
async fn test_skip_and_confirmation_rules() {
    let app = create_test_app();
    let problem_id = register_problem(&app.router, &["graphs"]).await;
    let user_id = unique_user();

    let (status, body) =
        request_hint(&app.router, &user_id, &problem_id, json!({ "level": 3 })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "skip_not_allowed");
    assert_eq!(body["retryable"], false);

    for _ in 0..3 {
        let (status, _) = request_hint(&app.router, &user_id, &problem_id, json!({})).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = request_hint(&app.router, &user_id, &problem_id, json!({})).await;
    assert_eq!(status, StatusCode::PRECONDITION_REQUIRED);
    assert_eq!(body["error"], "confirmation_required");

    let (status, body) =
        request_hint(&app.router, &user_id, &problem_id, json!({ "confirm": true })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hint"]["reveal_adjacent"], true);
    assert_eq!(body["hint"]["kind"], "implementation");
    assert_eq!(body["next_available"], false);

    let (status, body) =
        request_hint(&app.router, &user_id, &problem_id, json!({ "confirm": true })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "ladder_exhausted");

    let (status, body) =
        request_hint(&app.router, &user_id, &problem_id, json!({ "level": 0 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_level");
}

#[tokio::test]
async fn test_generation_failure_is_retryable_and_leaves_no_progress() {
    let app = create_test_app();
    let problem_id = register_problem(&app.router, &["trees"]).await;
    let user_id = unique_user();

    app.generator.set_failing(true);
    let (status, body) = request_hint(&app.router, &user_id, &problem_id, json!({})).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "generation_unavailable");
    assert_eq!(body["retryable"], true);

    let (status, session) = send(
        &app.router,
        "GET",
        &format!("/api/v1/users/{}/problems/{}/session", user_id, problem_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["unlocks"].as_array().unwrap().len(), 0);

    app.generator.set_failing(false);
    let (status, body) = request_hint(&app.router, &user_id, &problem_id, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hint"]["level"], 1);
}

#[tokio::test]
async fn test_concurrent_advances_unlock_once() {
    let app = create_test_app();
    let problem_id = register_problem(&app.router, &["heaps"]).await;
    let user_id = unique_user();

    let requests = (0..3).map(|_| request_hint(&app.router, &user_id, &problem_id, json!({})));
    let responses = futures::future::join_all(requests).await;

    let mut levels: Vec<u64> = responses
        .iter()
        .map(|(status, body)| {
            assert_eq!(*status, StatusCode::OK, "{}", body);
            body["hint"]["level"].as_u64().unwrap()
        })
        .collect();
    levels.sort();
    levels.dedup();

    let (_, session) = send(
        &app.router,
        "GET",
        &format!("/api/v1/users/{}/problems/{}/session", user_id, problem_id),
        None,
    )
    .await;
    let unlocks = session["unlocks"].as_array().unwrap();
    // Every unlocked level appears exactly once and in order.
    for (i, unlock) in unlocks.iter().enumerate() {
        assert_eq!(unlock["level"], i as u64 + 1);
    }
    assert_eq!(levels.last().copied(), Some(unlocks.len() as u64));
}

#[tokio::test]
async fn test_unknown_problem_is_not_found() {
    let app = create_test_app();
    let (status, body) = request_hint(&app.router, &unique_user(), "missing", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}
