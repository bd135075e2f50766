mod common;

use axum::http::StatusCode;
use serial_test::serial;

#[tokio::test]
#[serial]
#[ignore = "requires a running MongoDB (set MONGO_URI / .env.test)"]
async fn perfect_submission_scores_100_and_enters_cooldown() {
    let app = common::create_test_app().await;
    let quiz = common::seed_quiz(&app.mongo, 4, 24).await;
    let (token, _) = common::register_user(&app.router, &common::unique_email("cooldown")).await;

    let body = common::answers_body(&quiz, 4, 90);
    let response = common::submit_attempt(&app.router, &token, &quiz.id.to_hex(), &body).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = common::body_json(response).await;
    assert_eq!(json["score"], 100);
    assert_eq!(json["correctAnswers"], 4);
    assert_eq!(json["totalQuestions"], 4);
    assert_eq!(json["timeSpent"], 90);
    assert_eq!(json["detailedResults"].as_array().unwrap().len(), 4);
    assert_eq!(json["detailedResults"][0]["explanation"], "Explanation 1");

    // A second submission one moment later is blocked for 24 hours.
    let response = common::submit_attempt(&app.router, &token, &quiz.id.to_hex(), &body).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = common::body_json(response).await;
    assert!(json["nextAttemptAt"].is_string());

    // The cooldown endpoint agrees.
    let response = common::get_with_token(
        &app.router,
        &token,
        &format!("/api/v1/quizzes/{}/cooldown", quiz.id.to_hex()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = common::body_json(response).await;
    assert_eq!(json["canAttempt"], false);
    assert!(json["nextAttemptAt"].is_string());
}

#[tokio::test]
#[serial]
#[ignore = "requires a running MongoDB (set MONGO_URI / .env.test)"]
async fn zero_cooldown_allows_immediate_resubmission() {
    let app = common::create_test_app().await;
    let quiz = common::seed_quiz(&app.mongo, 2, 0).await;
    let (token, _) = common::register_user(&app.router, &common::unique_email("nocooldown")).await;

    let body = common::answers_body(&quiz, 2, 30);
    for _ in 0..2 {
        let response = common::submit_attempt(&app.router, &token, &quiz.id.to_hex(), &body).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
#[serial]
#[ignore = "requires a running MongoDB (set MONGO_URI / .env.test)"]
async fn partial_credit_rounds_to_nearest_percent() {
    let app = common::create_test_app().await;
    let quiz = common::seed_quiz(&app.mongo, 4, 0).await;
    let (token, _) = common::register_user(&app.router, &common::unique_email("partial")).await;

    let body = common::answers_body(&quiz, 2, 45);
    let response = common::submit_attempt(&app.router, &token, &quiz.id.to_hex(), &body).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = common::body_json(response).await;
    assert_eq!(json["score"], 50);
    assert_eq!(json["correctAnswers"], 2);
}

#[tokio::test]
#[serial]
#[ignore = "requires a running MongoDB (set MONGO_URI / .env.test)"]
async fn incomplete_answer_set_is_rejected_without_persisting() {
    let app = common::create_test_app().await;
    let quiz = common::seed_quiz(&app.mongo, 4, 24).await;
    let (token, _) = common::register_user(&app.router, &common::unique_email("mismatch")).await;

    let mut body = common::answers_body(&quiz, 4, 10);
    body["answers"].as_array_mut().unwrap().truncate(1);

    let response = common::submit_attempt(&app.router, &token, &quiz.id.to_hex(), &body).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Nothing was persisted: no result exists and the quiz stays attemptable.
    let response = common::get_with_token(
        &app.router,
        &token,
        &format!("/api/v1/quizzes/{}/results", quiz.id.to_hex()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = common::get_with_token(
        &app.router,
        &token,
        &format!("/api/v1/quizzes/{}/cooldown", quiz.id.to_hex()),
    )
    .await;
    let json = common::body_json(response).await;
    assert_eq!(json["canAttempt"], true);
}

#[tokio::test]
#[serial]
#[ignore = "requires a running MongoDB (set MONGO_URI / .env.test)"]
async fn unknown_option_id_fails_whole_submission() {
    let app = common::create_test_app().await;
    let quiz = common::seed_quiz(&app.mongo, 2, 24).await;
    let (token, _) = common::register_user(&app.router, &common::unique_email("badoption")).await;

    let mut body = common::answers_body(&quiz, 2, 10);
    body["answers"][0]["selectedOptionId"] =
        serde_json::json!(mongodb::bson::oid::ObjectId::new().to_hex());

    let response = common::submit_attempt(&app.router, &token, &quiz.id.to_hex(), &body).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[serial]
#[ignore = "requires a running MongoDB (set MONGO_URI / .env.test)"]
async fn missing_quiz_is_not_found() {
    let app = common::create_test_app().await;
    let (token, _) = common::register_user(&app.router, &common::unique_email("missing")).await;

    let body = serde_json::json!({ "answers": [], "timeSpent": 0 });
    let response = common::submit_attempt(
        &app.router,
        &token,
        &mongodb::bson::oid::ObjectId::new().to_hex(),
        &body,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[serial]
#[ignore = "requires a running MongoDB (set MONGO_URI / .env.test)"]
async fn results_endpoint_returns_latest_attempt() {
    let app = common::create_test_app().await;
    let quiz = common::seed_quiz(&app.mongo, 2, 0).await;
    let (token, _) = common::register_user(&app.router, &common::unique_email("results")).await;

    // First attempt scores 0, second scores 100; the endpoint reports the
    // most recent one.
    let response = common::submit_attempt(
        &app.router,
        &token,
        &quiz.id.to_hex(),
        &common::answers_body(&quiz, 0, 20),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = common::submit_attempt(
        &app.router,
        &token,
        &quiz.id.to_hex(),
        &common::answers_body(&quiz, 2, 25),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = common::get_with_token(
        &app.router,
        &token,
        &format!("/api/v1/quizzes/{}/results", quiz.id.to_hex()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = common::body_json(response).await;
    assert_eq!(json["score"], 100);
    assert_eq!(json["totalQuestions"], 2);
}
