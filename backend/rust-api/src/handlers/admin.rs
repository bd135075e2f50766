use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, from_document, oid::ObjectId};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    error::ApiError,
    extractors::AppJson,
    handlers::{claims_user_id, parse_object_id},
    middlewares::auth::JwtClaims,
    models::{
        attempt::AttemptRecord,
        quiz::{Difficulty, Quiz, QuizPayload, TopicRef},
        topic::Topic,
        user::User,
    },
    services::AppState,
    utils::time::{chrono_to_bson, start_of_day},
};

// ---------------------------------------------------------------------------
// Dashboard

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardUsers {
    pub total: i64,
    pub new_today: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardQuizzes {
    pub total_attempts: i64,
    pub average_score: i64,
    pub total_time_spent: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardTopic {
    pub id: String,
    pub name: String,
    pub quiz_count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityUser {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityQuiz {
    pub id: String,
    pub title: String,
    pub difficulty: Difficulty,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<TopicRef>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardActivity {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub user: ActivityUser,
    pub quiz: ActivityQuiz,
    pub score: i32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub users: DashboardUsers,
    pub quizzes: DashboardQuizzes,
    pub topics: Vec<DashboardTopic>,
    pub recent_activity: Vec<DashboardActivity>,
}

#[derive(Debug, Deserialize)]
struct UserStatsRow {
    total_users: i64,
    new_users_today: i64,
}

#[derive(Debug, Deserialize)]
struct AttemptStatsRow {
    total_attempts: i64,
    average_score: Option<f64>,
    total_quiz_time: i64,
}

#[derive(Debug, Deserialize)]
struct TopicCountRow {
    #[serde(rename = "_id")]
    id: ObjectId,
    name: String,
    quiz_count: i64,
}

/// GET /api/v1/admin/dashboard
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let today = chrono_to_bson(start_of_day(Utc::now()));

    let user_pipeline = vec![doc! {
        "$group": {
            "_id": null,
            "total_users": { "$sum": 1 },
            "new_users_today": {
                "$sum": { "$cond": [ { "$gte": ["$created_at", today] }, 1, 0 ] }
            },
        }
    }];

    let mut cursor = state
        .mongo
        .collection::<User>("users")
        .aggregate(user_pipeline)
        .await?;
    let user_stats = match cursor.try_next().await? {
        Some(row) => from_document(row).context("Failed to deserialize user stats")?,
        None => UserStatsRow {
            total_users: 0,
            new_users_today: 0,
        },
    };

    let attempt_pipeline = vec![doc! {
        "$group": {
            "_id": null,
            "total_attempts": { "$sum": 1 },
            "average_score": { "$avg": "$score" },
            "total_quiz_time": { "$sum": "$time_spent" },
        }
    }];

    let mut cursor = state
        .mongo
        .collection::<AttemptRecord>("results")
        .aggregate(attempt_pipeline)
        .await?;
    let attempt_stats = match cursor.try_next().await? {
        Some(row) => from_document(row).context("Failed to deserialize attempt stats")?,
        None => AttemptStatsRow {
            total_attempts: 0,
            average_score: None,
            total_quiz_time: 0,
        },
    };

    let topic_pipeline = vec![
        doc! {
            "$lookup": {
                "from": "quizzes",
                "localField": "_id",
                "foreignField": "topic_id",
                "as": "quizzes",
            }
        },
        doc! {
            "$project": {
                "name": 1,
                "quiz_count": { "$size": "$quizzes" },
            }
        },
        doc! { "$sort": { "quiz_count": -1 } },
    ];

    let mut cursor = state
        .mongo
        .collection::<Topic>("topics")
        .aggregate(topic_pipeline)
        .await?;
    let mut topics = Vec::new();
    while let Some(row) = cursor.try_next().await? {
        let row: TopicCountRow =
            from_document(row).context("Failed to deserialize topic count row")?;
        topics.push(DashboardTopic {
            id: row.id.to_hex(),
            name: row.name,
            quiz_count: row.quiz_count,
        });
    }

    let recent_activity = recent_activity(&state).await?;

    Ok(Json(DashboardResponse {
        users: DashboardUsers {
            total: user_stats.total_users,
            new_today: user_stats.new_users_today,
        },
        quizzes: DashboardQuizzes {
            total_attempts: attempt_stats.total_attempts,
            average_score: attempt_stats.average_score.unwrap_or_default().round() as i64,
            total_time_spent: attempt_stats.total_quiz_time,
        },
        topics,
        recent_activity,
    }))
}

async fn recent_activity(state: &AppState) -> Result<Vec<DashboardActivity>, ApiError> {
    let attempts: Vec<AttemptRecord> = state
        .mongo
        .collection::<AttemptRecord>("results")
        .find(doc! {})
        .sort(doc! { "completed_at": -1, "_id": -1 })
        .limit(10)
        .await?
        .try_collect()
        .await?;

    let user_ids: Vec<ObjectId> = attempts.iter().map(|a| a.user_id).collect();
    let quiz_ids: Vec<ObjectId> = attempts.iter().map(|a| a.quiz_id).collect();

    let users: Vec<User> = if user_ids.is_empty() {
        Vec::new()
    } else {
        state
            .mongo
            .collection::<User>("users")
            .find(doc! { "_id": { "$in": user_ids } })
            .await?
            .try_collect()
            .await?
    };

    let quizzes: Vec<Quiz> = if quiz_ids.is_empty() {
        Vec::new()
    } else {
        state
            .mongo
            .collection::<Quiz>("quizzes")
            .find(doc! { "_id": { "$in": quiz_ids } })
            .await?
            .try_collect()
            .await?
    };

    let topic_ids: Vec<ObjectId> = quizzes.iter().map(|q| q.topic_id).collect();
    let topics: Vec<Topic> = if topic_ids.is_empty() {
        Vec::new()
    } else {
        state
            .mongo
            .collection::<Topic>("topics")
            .find(doc! { "_id": { "$in": topic_ids } })
            .await?
            .try_collect()
            .await?
    };

    let activity = attempts
        .iter()
        .filter_map(|attempt| {
            let user = users.iter().find(|u| u.id == attempt.user_id)?;
            let quiz = quizzes.iter().find(|q| q.id == attempt.quiz_id)?;
            let topic = topics.iter().find(|t| t.id == quiz.topic_id);
            Some(DashboardActivity {
                id: attempt.id.to_hex(),
                kind: "QUIZ_COMPLETED",
                user: ActivityUser {
                    id: user.id.to_hex(),
                    name: user.name.clone(),
                },
                quiz: ActivityQuiz {
                    id: quiz.id.to_hex(),
                    title: quiz.title.clone(),
                    difficulty: quiz.difficulty,
                    topic: topic.map(|t| TopicRef {
                        id: t.id.to_hex(),
                        name: t.name.clone(),
                    }),
                },
                score: attempt.score,
                timestamp: attempt.completed_at,
            })
        })
        .collect();

    Ok(activity)
}

// ---------------------------------------------------------------------------
// Quiz authoring

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthoredQuizResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub topic: TopicRef,
    pub difficulty: Difficulty,
    pub time_limit: u32,
    pub tags: Vec<String>,
    pub cooldown_hours: i64,
    pub question_count: usize,
    pub created_at: DateTime<Utc>,
}

fn authored_response(quiz: &Quiz, topic: &Topic) -> AuthoredQuizResponse {
    AuthoredQuizResponse {
        id: quiz.id.to_hex(),
        title: quiz.title.clone(),
        description: quiz.description.clone(),
        topic: TopicRef {
            id: topic.id.to_hex(),
            name: topic.name.clone(),
        },
        difficulty: quiz.difficulty,
        time_limit: quiz.time_limit,
        tags: quiz.tags.clone(),
        cooldown_hours: quiz.cooldown_hours,
        question_count: quiz.questions.len(),
        created_at: quiz.created_at,
    }
}

async fn load_topic(state: &AppState, topic_id: ObjectId) -> Result<Topic, ApiError> {
    state
        .mongo
        .collection::<Topic>("topics")
        .find_one(doc! { "_id": topic_id })
        .await?
        .ok_or_else(|| ApiError::validation("Topic not found"))
}

/// POST /api/v1/admin/quizzes
pub async fn create_quiz(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(payload): AppJson<QuizPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| ApiError::validation(format!("Validation error: {}", e)))?;

    let created_by = claims_user_id(&claims)?;
    let topic_id = parse_object_id(&payload.topic_id, "topic")?;
    let topic = load_topic(&state, topic_id).await?;

    let quiz = payload.into_quiz(topic_id, created_by);
    state
        .mongo
        .collection::<Quiz>("quizzes")
        .insert_one(&quiz)
        .await?;

    tracing::info!("Quiz created: {} ({})", quiz.title, quiz.id);

    Ok((
        StatusCode::CREATED,
        Json(authored_response(&quiz, &topic)),
    ))
}

/// PUT /api/v1/admin/quizzes/{id} - full replacement. Question and option
/// ids are reminted; existing attempts are unaffected because they carry
/// their own answer snapshots.
pub async fn update_quiz(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(payload): AppJson<QuizPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| ApiError::validation(format!("Validation error: {}", e)))?;

    let quiz_id = parse_object_id(&id, "quiz")?;
    let quizzes = state.mongo.collection::<Quiz>("quizzes");

    let existing = quizzes
        .find_one(doc! { "_id": quiz_id })
        .await?
        .ok_or_else(|| ApiError::not_found("Quiz not found"))?;

    let topic_id = parse_object_id(&payload.topic_id, "topic")?;
    let topic = load_topic(&state, topic_id).await?;

    let mut quiz = payload.into_quiz(topic_id, existing.created_by);
    quiz.id = existing.id;
    quiz.created_at = existing.created_at;

    quizzes.replace_one(doc! { "_id": quiz_id }, &quiz).await?;

    tracing::info!("Quiz updated: {} ({})", quiz.title, quiz.id);

    Ok(Json(authored_response(&quiz, &topic)))
}

/// DELETE /api/v1/admin/quizzes/{id} - cascades the quiz's results.
pub async fn delete_quiz(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let quiz_id = parse_object_id(&id, "quiz")?;
    let quizzes = state.mongo.collection::<Quiz>("quizzes");

    let quiz = quizzes
        .find_one(doc! { "_id": quiz_id })
        .await?
        .ok_or_else(|| ApiError::not_found("Quiz not found"))?;

    state
        .mongo
        .collection::<AttemptRecord>("results")
        .delete_many(doc! { "quiz_id": quiz_id })
        .await?;
    quizzes.delete_one(doc! { "_id": quiz_id }).await?;

    tracing::info!("Quiz deleted: {} ({})", quiz.title, quiz.id);

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Quiz analytics

#[derive(Debug, Deserialize)]
struct AnalyticsRow {
    total_attempts: i64,
    average_score: Option<f64>,
    average_time: Option<f64>,
    #[serde(default)]
    score_distribution: Vec<i32>,
}

#[derive(Debug, Default, PartialEq, Serialize)]
pub struct ScoreDistribution {
    #[serde(rename = "0-20")]
    pub bucket_0_20: u64,
    #[serde(rename = "21-40")]
    pub bucket_21_40: u64,
    #[serde(rename = "41-60")]
    pub bucket_41_60: u64,
    #[serde(rename = "61-80")]
    pub bucket_61_80: u64,
    #[serde(rename = "81-100")]
    pub bucket_81_100: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsQuiz {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<TopicRef>,
    pub difficulty: Difficulty,
    pub question_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAnalytics {
    pub total_attempts: i64,
    pub average_score: i64,
    pub average_time: i64,
    pub score_distribution: ScoreDistribution,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    pub quiz: AnalyticsQuiz,
    pub analytics: QuizAnalytics,
}

/// GET /api/v1/admin/quizzes/{id}/analytics
pub async fn quiz_analytics(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let quiz_id = parse_object_id(&id, "quiz")?;

    let quiz = state
        .mongo
        .collection::<Quiz>("quizzes")
        .find_one(doc! { "_id": quiz_id })
        .await?
        .ok_or_else(|| ApiError::not_found("Quiz not found"))?;

    let topic = state
        .mongo
        .collection::<Topic>("topics")
        .find_one(doc! { "_id": quiz.topic_id })
        .await?
        .map(|t| TopicRef {
            id: t.id.to_hex(),
            name: t.name,
        });

    let pipeline = vec![
        doc! { "$match": { "quiz_id": quiz_id } },
        doc! {
            "$group": {
                "_id": null,
                "total_attempts": { "$sum": 1 },
                "average_score": { "$avg": "$score" },
                "average_time": { "$avg": "$time_spent" },
                "score_distribution": { "$push": "$score" },
            }
        },
    ];

    let mut cursor = state
        .mongo
        .collection::<AttemptRecord>("results")
        .aggregate(pipeline)
        .await?;
    let row: AnalyticsRow = match cursor.try_next().await? {
        Some(row) => from_document(row).context("Failed to deserialize analytics row")?,
        None => AnalyticsRow {
            total_attempts: 0,
            average_score: None,
            average_time: None,
            score_distribution: Vec::new(),
        },
    };

    Ok(Json(AnalyticsResponse {
        quiz: AnalyticsQuiz {
            id: quiz.id.to_hex(),
            title: quiz.title.clone(),
            topic,
            difficulty: quiz.difficulty,
            question_count: quiz.questions.len(),
        },
        analytics: QuizAnalytics {
            total_attempts: row.total_attempts,
            average_score: row.average_score.unwrap_or_default().round() as i64,
            average_time: row.average_time.unwrap_or_default().round() as i64,
            score_distribution: bucket_scores(&row.score_distribution),
        },
    }))
}

fn bucket_scores(scores: &[i32]) -> ScoreDistribution {
    let mut distribution = ScoreDistribution::default();
    for &score in scores {
        if score <= 20 {
            distribution.bucket_0_20 += 1;
        } else if score <= 40 {
            distribution.bucket_21_40 += 1;
        } else if score <= 60 {
            distribution.bucket_41_60 += 1;
        } else if score <= 80 {
            distribution.bucket_61_80 += 1;
        } else {
            distribution.bucket_81_100 += 1;
        }
    }
    distribution
}
