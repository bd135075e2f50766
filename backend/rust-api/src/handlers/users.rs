use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Extension, Json,
};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, from_document, oid::ObjectId},
    Collection,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    error::{is_duplicate_key, ApiError},
    extractors::AppJson,
    handlers::claims_user_id,
    middlewares::auth::JwtClaims,
    models::{
        attempt::AttemptRecord,
        quiz::{Difficulty, Quiz},
        topic::Topic,
        user::{UpdateProfileRequest, User, UserProfile},
        PageQuery,
    },
    services::AppState,
};

fn users(state: &AppState) -> Collection<User> {
    state.mongo.collection("users")
}

fn results(state: &AppState) -> Collection<AttemptRecord> {
    state.mongo.collection("results")
}

// ---------------------------------------------------------------------------
// Aggregation rows

#[derive(Debug, Deserialize)]
struct OverallStatsRow {
    total_attempts: i64,
    average_score: Option<f64>,
    total_time_taken: i64,
    highest_score: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TopicProgressRow {
    #[serde(rename = "_id")]
    topic_id: ObjectId,
    total_quizzes: i64,
    attempted_quizzes: i64,
    average_score: Option<f64>,
    topic: Topic,
}

// ---------------------------------------------------------------------------
// Response DTOs

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicProgressDetail {
    pub completion: i64,
    pub average_score: i64,
    pub total_quizzes: i64,
    pub attempted_quizzes: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicProgressView {
    pub id: String,
    pub name: String,
    pub progress: TopicProgressDetail,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityItem {
    pub id: String,
    pub quiz_title: String,
    pub quiz_difficulty: Difficulty,
    pub score: i32,
    pub time_spent: i64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileStats {
    pub total_attempts: i64,
    pub average_score: i64,
    pub total_time_taken: i64,
    pub highest_score: i64,
    pub topic_progress: Vec<TopicProgressView>,
    pub recent_activity: Vec<ActivityItem>,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: UserProfile,
    pub stats: ProfileStats,
}

#[derive(Debug, Default, Serialize)]
pub struct QuizzesByDifficulty {
    #[serde(rename = "EASY")]
    pub easy: u64,
    #[serde(rename = "MEDIUM")]
    pub medium: u64,
    #[serde(rename = "HARD")]
    pub hard: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total_quizzes_taken: i64,
    pub average_score: i64,
    pub total_time_taken: i64,
    pub best_score: i64,
    pub quizzes_by_difficulty: QuizzesByDifficulty,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuizRef {
    pub id: String,
    pub title: String,
    pub difficulty: Difficulty,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub id: String,
    pub quiz: HistoryQuizRef,
    pub score: i32,
    pub time_spent: i64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub results: Vec<HistoryItem>,
    pub total: u64,
    pub page: i64,
    pub total_pages: u64,
}

// ---------------------------------------------------------------------------
// Handlers

/// GET /api/v1/user/profile - identity plus aggregate statistics.
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims_user_id(&claims)?;

    let user = users(&state)
        .find_one(doc! { "_id": user_id })
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let overall = overall_stats(&state, user_id).await?;
    let topic_progress = topic_progress(&state, user_id).await?;
    let recent_activity = recent_activity(&state, user_id, 10).await?;

    Ok(Json(ProfileResponse {
        user: UserProfile::from(&user),
        stats: ProfileStats {
            total_attempts: overall.total_attempts,
            average_score: overall.average_score.unwrap_or_default().round() as i64,
            total_time_taken: overall.total_time_taken,
            highest_score: overall.highest_score.unwrap_or_default(),
            topic_progress,
            recent_activity,
        },
    }))
}

/// GET /api/v1/user/profile/stats
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims_user_id(&claims)?;

    let overall = overall_stats(&state, user_id).await?;

    // Difficulty distribution over the distinct quizzes the user attempted.
    let quiz_ids: Vec<ObjectId> = results(&state)
        .distinct("quiz_id", doc! { "user_id": user_id })
        .await?
        .into_iter()
        .filter_map(|value| value.as_object_id())
        .collect();

    let mut by_difficulty = QuizzesByDifficulty::default();
    if !quiz_ids.is_empty() {
        let quizzes: Vec<Quiz> = state
            .mongo
            .collection::<Quiz>("quizzes")
            .find(doc! { "_id": { "$in": quiz_ids } })
            .await?
            .try_collect()
            .await?;
        for quiz in quizzes {
            match quiz.difficulty {
                Difficulty::Easy => by_difficulty.easy += 1,
                Difficulty::Medium => by_difficulty.medium += 1,
                Difficulty::Hard => by_difficulty.hard += 1,
            }
        }
    }

    Ok(Json(StatsResponse {
        total_quizzes_taken: overall.total_attempts,
        average_score: overall.average_score.unwrap_or_default().round() as i64,
        total_time_taken: overall.total_time_taken,
        best_score: overall.highest_score.unwrap_or_default(),
        quizzes_by_difficulty: by_difficulty,
    }))
}

/// GET /api/v1/user/profile/activity - the ten most recent attempts.
pub async fn get_activity(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims_user_id(&claims)?;
    let activity = recent_activity(&state, user_id, 10).await?;
    Ok(Json(activity))
}

/// GET /api/v1/user/profile/history - paginated attempt history.
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims_user_id(&claims)?;
    let (page, limit, skip) = query.resolve();

    let filter = doc! { "user_id": user_id };
    let total = results(&state).count_documents(filter.clone()).await?;

    let attempts: Vec<AttemptRecord> = results(&state)
        .find(filter)
        .sort(doc! { "completed_at": -1, "_id": -1 })
        .skip(skip)
        .limit(limit)
        .await?
        .try_collect()
        .await?;

    let quiz_map = quizzes_by_id(&state, attempts.iter().map(|a| a.quiz_id)).await?;
    let topic_map = topics_by_id(&state, quiz_map.values().map(|q| q.topic_id)).await?;

    let items = attempts
        .iter()
        .filter_map(|attempt| {
            let quiz = quiz_map.get(&attempt.quiz_id)?;
            Some(HistoryItem {
                id: attempt.id.to_hex(),
                quiz: HistoryQuizRef {
                    id: quiz.id.to_hex(),
                    title: quiz.title.clone(),
                    difficulty: quiz.difficulty,
                    topic: topic_map.get(&quiz.topic_id).map(|t| t.name.clone()),
                },
                score: attempt.score,
                time_spent: attempt.time_spent,
                completed_at: attempt.completed_at,
            })
        })
        .collect();

    Ok(Json(HistoryResponse {
        results: items,
        total,
        page,
        total_pages: PageQuery::total_pages(total, limit),
    }))
}

/// PUT /api/v1/user/profile - name/email/password change.
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()
        .map_err(|e| ApiError::validation(format!("Validation error: {}", e)))?;

    let user_id = claims_user_id(&claims)?;

    let user = users(&state)
        .find_one(doc! { "_id": user_id })
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let mut updates = doc! {};

    if let Some(name) = &req.name {
        updates.insert("name", name);
    }

    if let Some(email) = &req.email {
        let email = email.to_lowercase();
        if email != user.email {
            let taken = users(&state)
                .find_one(doc! { "_id": { "$ne": user_id }, "email": &email })
                .await?;
            if taken.is_some() {
                return Err(ApiError::conflict("Email already in use"));
            }
        }
        updates.insert("email", email);
    }

    match (&req.current_password, &req.new_password) {
        (Some(current), Some(new_password)) => {
            let matches =
                verify(current, &user.password_hash).context("Failed to verify password")?;
            if !matches {
                return Err(ApiError::validation("Current password is incorrect"));
            }
            let password_hash =
                hash(new_password, DEFAULT_COST).context("Failed to hash password")?;
            updates.insert("password_hash", password_hash);
        }
        (None, None) => {}
        _ => {
            return Err(ApiError::validation(
                "Both current and new password are required to change the password",
            ));
        }
    }

    if !updates.is_empty() {
        if let Err(err) = users(&state)
            .update_one(doc! { "_id": user_id }, doc! { "$set": updates })
            .await
        {
            if is_duplicate_key(&err) {
                return Err(ApiError::conflict("Email already in use"));
            }
            return Err(err.into());
        }
    }

    let updated = users(&state)
        .find_one(doc! { "_id": user_id })
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    tracing::info!("Profile updated: {}", user_id);

    Ok(Json(serde_json::json!({ "user": UserProfile::from(&updated) })))
}

// ---------------------------------------------------------------------------
// Shared lookups

async fn overall_stats(state: &AppState, user_id: ObjectId) -> Result<OverallStatsRow, ApiError> {
    let pipeline = vec![
        doc! { "$match": { "user_id": user_id } },
        doc! {
            "$group": {
                "_id": null,
                "total_attempts": { "$sum": 1 },
                "average_score": { "$avg": "$score" },
                "total_time_taken": { "$sum": "$time_spent" },
                "highest_score": { "$max": "$score" },
            }
        },
    ];

    let mut cursor = results(state).aggregate(pipeline).await?;
    match cursor.try_next().await? {
        Some(row) => {
            let stats = from_document(row).context("Failed to deserialize stats row")?;
            Ok(stats)
        }
        None => Ok(OverallStatsRow {
            total_attempts: 0,
            average_score: None,
            total_time_taken: 0,
            highest_score: None,
        }),
    }
}

async fn topic_progress(
    state: &AppState,
    user_id: ObjectId,
) -> Result<Vec<TopicProgressView>, ApiError> {
    let pipeline = vec![
        doc! {
            "$lookup": {
                "from": "results",
                "localField": "_id",
                "foreignField": "quiz_id",
                "pipeline": [ { "$match": { "user_id": user_id } } ],
                "as": "attempts",
            }
        },
        doc! {
            "$group": {
                "_id": "$topic_id",
                "total_quizzes": { "$sum": 1 },
                "attempted_quizzes": {
                    "$sum": { "$cond": [ { "$gt": [ { "$size": "$attempts" }, 0 ] }, 1, 0 ] }
                },
                "average_score": { "$avg": { "$avg": "$attempts.score" } },
            }
        },
        doc! {
            "$lookup": {
                "from": "topics",
                "localField": "_id",
                "foreignField": "_id",
                "as": "topic",
            }
        },
        doc! { "$unwind": "$topic" },
    ];

    let mut cursor = state
        .mongo
        .collection::<Quiz>("quizzes")
        .aggregate(pipeline)
        .await?;

    let mut views = Vec::new();
    while let Some(row) = cursor.try_next().await? {
        let row: TopicProgressRow =
            from_document(row).context("Failed to deserialize topic progress row")?;
        let completion = if row.total_quizzes > 0 {
            ((row.attempted_quizzes as f64 / row.total_quizzes as f64) * 100.0).round() as i64
        } else {
            0
        };
        views.push(TopicProgressView {
            id: row.topic_id.to_hex(),
            name: row.topic.name.clone(),
            progress: TopicProgressDetail {
                completion,
                average_score: row.average_score.unwrap_or_default().round() as i64,
                total_quizzes: row.total_quizzes,
                attempted_quizzes: row.attempted_quizzes,
            },
        });
    }

    Ok(views)
}

async fn recent_activity(
    state: &AppState,
    user_id: ObjectId,
    limit: i64,
) -> Result<Vec<ActivityItem>, ApiError> {
    let attempts: Vec<AttemptRecord> = results(state)
        .find(doc! { "user_id": user_id })
        .sort(doc! { "completed_at": -1, "_id": -1 })
        .limit(limit)
        .await?
        .try_collect()
        .await?;

    let quiz_map = quizzes_by_id(state, attempts.iter().map(|a| a.quiz_id)).await?;

    Ok(attempts
        .iter()
        .filter_map(|attempt| {
            let quiz = quiz_map.get(&attempt.quiz_id)?;
            Some(ActivityItem {
                id: attempt.id.to_hex(),
                quiz_title: quiz.title.clone(),
                quiz_difficulty: quiz.difficulty,
                score: attempt.score,
                time_spent: attempt.time_spent,
                completed_at: attempt.completed_at,
            })
        })
        .collect())
}

async fn quizzes_by_id(
    state: &AppState,
    ids: impl Iterator<Item = ObjectId>,
) -> Result<HashMap<ObjectId, Quiz>, ApiError> {
    let ids: Vec<ObjectId> = ids.collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let quizzes: Vec<Quiz> = state
        .mongo
        .collection::<Quiz>("quizzes")
        .find(doc! { "_id": { "$in": ids } })
        .await?
        .try_collect()
        .await?;

    Ok(quizzes.into_iter().map(|q| (q.id, q)).collect())
}

async fn topics_by_id(
    state: &AppState,
    ids: impl Iterator<Item = ObjectId>,
) -> Result<HashMap<ObjectId, Topic>, ApiError> {
    let ids: Vec<ObjectId> = ids.collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let topics: Vec<Topic> = state
        .mongo
        .collection::<Topic>("topics")
        .find(doc! { "_id": { "$in": ids } })
        .await?
        .try_collect()
        .await?;

    Ok(topics.into_iter().map(|t| (t.id, t)).collect())
}
