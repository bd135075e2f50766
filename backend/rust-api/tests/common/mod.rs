#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use mongodb::{
    bson::{doc, oid::ObjectId},
    Database,
};
use quizcraft_api::{
    config::Config,
    create_router,
    models::achievement::{Achievement, AchievementKind},
    models::quiz::{Question, Quiz, QuizOption},
    services::AppState,
};
use std::sync::Arc;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub mongo: Database,
}

pub async fn create_test_app() -> TestApp {
    // Initialize tracing for tests
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    // Load test environment from .env.test
    dotenvy::from_filename(".env.test").ok();

    let config = Config::load().expect("Failed to load test configuration");

    let mongo_client = mongodb::Client::with_uri_str(&config.mongo_uri)
        .await
        .expect("Failed to connect to test MongoDB");
    let mongo = mongo_client.database(&config.mongo_database);

    // Achievements must exist before AppState loads the catalog.
    seed_achievements(&mongo).await;

    let app_state = Arc::new(
        AppState::new(config, mongo_client)
            .await
            .expect("Failed to initialize test app state"),
    );

    TestApp {
        router: create_router(app_state),
        mongo,
    }
}

async fn seed_achievements(mongo: &Database) {
    let seeds = [
        ("Quiz Novice", AchievementKind::QuizCount, 5, 10),
        ("Perfect Score", AchievementKind::QuizScore, 100, 20),
        ("Daily Streak", AchievementKind::Streak, 3, 15),
        ("Topic Master", AchievementKind::TopicMastery, 3, 30),
    ];

    let collection = mongo.collection::<Achievement>("achievements");
    for (name, kind, threshold, points) in seeds {
        let existing = collection
            .find_one(doc! { "name": name })
            .await
            .expect("Failed to check achievement seed");
        if existing.is_some() {
            continue;
        }

        let achievement = Achievement {
            id: ObjectId::new(),
            name: name.to_string(),
            description: format!("{} achievement", name),
            icon: "trophy".to_string(),
            kind,
            threshold,
            points,
        };

        // Ignore duplicate key errors from parallel test binaries.
        let _ = collection.insert_one(&achievement).await;
    }
}

/// Inserts a quiz directly so tests know every question and option id.
pub async fn seed_quiz(mongo: &Database, question_count: usize, cooldown_hours: i64) -> Quiz {
    let questions = (0..question_count)
        .map(|i| Question {
            id: ObjectId::new(),
            text: format!("Question {}", i + 1),
            options: vec![
                QuizOption {
                    id: ObjectId::new(),
                    text: "Right".to_string(),
                    is_correct: true,
                },
                QuizOption {
                    id: ObjectId::new(),
                    text: "Wrong".to_string(),
                    is_correct: false,
                },
            ],
            explanation: format!("Explanation {}", i + 1),
        })
        .collect();

    let quiz = Quiz {
        id: ObjectId::new(),
        title: "Integration test quiz".to_string(),
        description: "Seeded by tests".to_string(),
        topic_id: ObjectId::new(),
        difficulty: quizcraft_api::models::quiz::Difficulty::Easy,
        time_limit: 10,
        tags: vec![],
        questions,
        cooldown_hours,
        created_at: Utc::now(),
        created_by: ObjectId::new(),
    };

    mongo
        .collection::<Quiz>("quizzes")
        .insert_one(&quiz)
        .await
        .expect("Failed to seed quiz");

    quiz
}

/// Answers body selecting the correct option for the first `correct` questions
/// and a wrong option for the rest.
pub fn answers_body(quiz: &Quiz, correct: usize, time_spent: i64) -> serde_json::Value {
    let answers: Vec<serde_json::Value> = quiz
        .questions
        .iter()
        .enumerate()
        .map(|(i, question)| {
            let option = if i < correct {
                &question.options[0]
            } else {
                &question.options[1]
            };
            serde_json::json!({
                "questionId": question.id.to_hex(),
                "selectedOptionId": option.id.to_hex(),
            })
        })
        .collect();

    serde_json::json!({ "answers": answers, "timeSpent": time_spent })
}

pub async fn register_user(router: &Router, email: &str) -> (String, String) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/auth/register")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "name": "Test User",
                        "email": email,
                        "password": "secret123"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    let token = body["accessToken"].as_str().unwrap().to_string();
    let user_id = body["user"]["id"].as_str().unwrap().to_string();
    (token, user_id)
}

pub async fn submit_attempt(
    router: &Router,
    token: &str,
    quiz_id: &str,
    body: &serde_json::Value,
) -> axum::http::Response<Body> {
    router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/v1/quizzes/{}/submit", quiz_id))
                .header("content-type", "application/json")
                .header("authorization", format!("Bearer {}", token))
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

pub async fn get_with_token(
    router: &Router,
    token: &str,
    uri: &str,
) -> axum::http::Response<Body> {
    router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(uri)
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

pub async fn body_json(response: axum::http::Response<Body>) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn unique_email(prefix: &str) -> String {
    format!("{}-{}@example.com", prefix, uuid::Uuid::new_v4())
}
