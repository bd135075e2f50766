use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, from_document, oid::ObjectId, Document};
use serde::{Deserialize, Serialize};

use crate::{
    error::ApiError,
    handlers::parse_object_id,
    models::{attempt::AttemptRecord, PageQuery},
    services::AppState,
    utils::time::{chrono_to_bson, start_of_week},
};

// ---------------------------------------------------------------------------
// Rows and DTOs

#[derive(Debug, Deserialize)]
struct AverageRow {
    user_id: ObjectId,
    name: String,
    average_score: f64,
    quizzes_taken: i64,
    average_time: f64,
}

#[derive(Debug, Deserialize)]
struct WeeklyRow {
    user_id: ObjectId,
    name: String,
    total_score: i64,
    quizzes_taken: i64,
    average_time: f64,
}

#[derive(Debug, Deserialize)]
struct QuizRow {
    user_id: ObjectId,
    name: String,
    score: i32,
    time_spent: i64,
    #[serde(with = "crate::utils::time::bson_datetime_as_chrono")]
    completed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AverageEntry {
    pub rank: u64,
    pub user_id: String,
    pub name: String,
    pub average_score: f64,
    pub quizzes_taken: i64,
    pub average_time: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyEntry {
    pub rank: u64,
    pub user_id: String,
    pub name: String,
    pub total_score: i64,
    pub quizzes_taken: i64,
    pub average_time: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizEntry {
    pub rank: u64,
    pub user_id: String,
    pub name: String,
    pub score: i32,
    pub time_spent: i64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardResponse<T> {
    pub leaderboard: Vec<T>,
    pub total: u64,
    pub page: i64,
    pub total_pages: u64,
}

// ---------------------------------------------------------------------------
// Handlers

/// GET /api/v1/leaderboard/global - users ranked by average score.
pub async fn global(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, limit, skip) = query.resolve();

    let entries = average_leaderboard(&state, doc! {}, skip, limit).await?;
    let total = distinct_user_count(&state, doc! {}).await?;

    Ok(Json(LeaderboardResponse {
        leaderboard: entries,
        total,
        page,
        total_pages: PageQuery::total_pages(total, limit),
    }))
}

/// GET /api/v1/leaderboard/topic/{topicId} - ranking over one topic's quizzes.
pub async fn topic(
    State(state): State<Arc<AppState>>,
    Path(topic_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let topic_id = parse_object_id(&topic_id, "topic")?;
    let (page, limit, skip) = query.resolve();

    let quiz_ids: Vec<ObjectId> = state
        .mongo
        .collection::<Document>("quizzes")
        .distinct("_id", doc! { "topic_id": topic_id })
        .await?
        .into_iter()
        .filter_map(|value| value.as_object_id())
        .collect();

    if quiz_ids.is_empty() {
        return Ok(Json(LeaderboardResponse {
            leaderboard: Vec::new(),
            total: 0,
            page: 1,
            total_pages: 0,
        }));
    }

    let filter = doc! { "quiz_id": { "$in": quiz_ids } };
    let entries = average_leaderboard(&state, filter.clone(), skip, limit).await?;
    let total = distinct_user_count(&state, filter).await?;

    Ok(Json(LeaderboardResponse {
        leaderboard: entries,
        total,
        page,
        total_pages: PageQuery::total_pages(total, limit),
    }))
}

/// GET /api/v1/leaderboard/quiz/{quizId} - individual attempts, best first.
pub async fn quiz(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let quiz_id = parse_object_id(&quiz_id, "quiz")?;
    let (page, limit, skip) = query.resolve();

    let pipeline = vec![
        doc! { "$match": { "quiz_id": quiz_id } },
        doc! {
            "$lookup": {
                "from": "users",
                "localField": "user_id",
                "foreignField": "_id",
                "as": "user",
            }
        },
        doc! { "$unwind": "$user" },
        doc! {
            "$project": {
                "_id": 0,
                "user_id": 1,
                "name": "$user.name",
                "score": 1,
                "time_spent": 1,
                "completed_at": 1,
            }
        },
        doc! { "$sort": { "score": -1, "time_spent": 1 } },
        doc! { "$skip": skip as i64 },
        doc! { "$limit": limit },
    ];

    let mut cursor = state
        .mongo
        .collection::<AttemptRecord>("results")
        .aggregate(pipeline)
        .await?;

    let mut entries = Vec::new();
    while let Some(row) = cursor.try_next().await? {
        let row: QuizRow = from_document(row).context("Failed to deserialize leaderboard row")?;
        entries.push(QuizEntry {
            rank: skip + entries.len() as u64 + 1,
            user_id: row.user_id.to_hex(),
            name: row.name,
            score: row.score,
            time_spent: row.time_spent,
            completed_at: row.completed_at,
        });
    }

    let total = state
        .mongo
        .collection::<AttemptRecord>("results")
        .count_documents(doc! { "quiz_id": quiz_id })
        .await?;

    Ok(Json(LeaderboardResponse {
        leaderboard: entries,
        total,
        page,
        total_pages: PageQuery::total_pages(total, limit),
    }))
}

/// GET /api/v1/leaderboard/weekly - total score since Sunday 00:00 UTC.
pub async fn weekly(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, limit, skip) = query.resolve();

    let week_start = chrono_to_bson(start_of_week(Utc::now()));
    let filter = doc! { "completed_at": { "$gte": week_start } };

    let pipeline = vec![
        doc! { "$match": filter.clone() },
        doc! {
            "$group": {
                "_id": "$user_id",
                "total_score": { "$sum": "$score" },
                "quizzes_taken": { "$sum": 1 },
                "average_time": { "$avg": "$time_spent" },
            }
        },
        doc! {
            "$lookup": {
                "from": "users",
                "localField": "_id",
                "foreignField": "_id",
                "as": "user",
            }
        },
        doc! { "$unwind": "$user" },
        doc! {
            "$project": {
                "_id": 0,
                "user_id": "$_id",
                "name": "$user.name",
                "total_score": 1,
                "quizzes_taken": 1,
                "average_time": { "$round": ["$average_time", 0] },
            }
        },
        doc! { "$sort": { "total_score": -1, "quizzes_taken": -1 } },
        doc! { "$skip": skip as i64 },
        doc! { "$limit": limit },
    ];

    let mut cursor = state
        .mongo
        .collection::<AttemptRecord>("results")
        .aggregate(pipeline)
        .await?;

    let mut entries = Vec::new();
    while let Some(row) = cursor.try_next().await? {
        let row: WeeklyRow = from_document(row).context("Failed to deserialize weekly row")?;
        entries.push(WeeklyEntry {
            rank: skip + entries.len() as u64 + 1,
            user_id: row.user_id.to_hex(),
            name: row.name,
            total_score: row.total_score,
            quizzes_taken: row.quizzes_taken,
            average_time: row.average_time.round() as i64,
        });
    }

    let total = distinct_user_count(&state, filter).await?;

    Ok(Json(LeaderboardResponse {
        leaderboard: entries,
        total,
        page,
        total_pages: PageQuery::total_pages(total, limit),
    }))
}

// ---------------------------------------------------------------------------
// Shared pipelines

async fn average_leaderboard(
    state: &AppState,
    filter: Document,
    skip: u64,
    limit: i64,
) -> Result<Vec<AverageEntry>, ApiError> {
    let mut pipeline = Vec::new();
    if !filter.is_empty() {
        pipeline.push(doc! { "$match": filter });
    }
    pipeline.extend([
        doc! {
            "$group": {
                "_id": "$user_id",
                "total_score": { "$avg": "$score" },
                "quizzes_taken": { "$sum": 1 },
                "total_time": { "$sum": "$time_spent" },
            }
        },
        doc! {
            "$lookup": {
                "from": "users",
                "localField": "_id",
                "foreignField": "_id",
                "as": "user",
            }
        },
        doc! { "$unwind": "$user" },
        doc! {
            "$project": {
                "_id": 0,
                "user_id": "$_id",
                "name": "$user.name",
                "average_score": { "$round": ["$total_score", 1] },
                "quizzes_taken": 1,
                "average_time": {
                    "$round": [ { "$divide": ["$total_time", "$quizzes_taken"] }, 0 ]
                },
            }
        },
        doc! { "$sort": { "average_score": -1, "quizzes_taken": -1 } },
        doc! { "$skip": skip as i64 },
        doc! { "$limit": limit },
    ]);

    let mut cursor = state
        .mongo
        .collection::<AttemptRecord>("results")
        .aggregate(pipeline)
        .await?;

    let mut entries = Vec::new();
    while let Some(row) = cursor.try_next().await? {
        let row: AverageRow =
            from_document(row).context("Failed to deserialize leaderboard row")?;
        entries.push(AverageEntry {
            rank: skip + entries.len() as u64 + 1,
            user_id: row.user_id.to_hex(),
            name: row.name,
            average_score: row.average_score,
            quizzes_taken: row.quizzes_taken,
            average_time: row.average_time.round() as i64,
        });
    }

    Ok(entries)
}

async fn distinct_user_count(state: &AppState, filter: Document) -> Result<u64, ApiError> {
    let users = state
        .mongo
        .collection::<AttemptRecord>("results")
        .distinct("user_id", filter)
        .await?;
    Ok(users.len() as u64)
}
