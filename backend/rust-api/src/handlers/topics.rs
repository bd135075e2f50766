use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Document},
    Collection,
};
use serde::Serialize;
use validator::Validate;

use crate::{
    error::{is_duplicate_key, ApiError},
    extractors::AppJson,
    handlers::parse_object_id,
    models::{
        quiz::Quiz,
        topic::{DifficultyCounts, Topic, TopicPayload, TopicStats, TopicView},
    },
    services::AppState,
};

fn topics(state: &AppState) -> Collection<Topic> {
    state.mongo.collection("topics")
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicBrief {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Topic> for TopicBrief {
    fn from(topic: &Topic) -> Self {
        Self {
            id: topic.id.to_hex(),
            name: topic.name.clone(),
            description: topic.description.clone(),
            created_at: topic.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TopicListResponse {
    pub topics: Vec<TopicView>,
}

/// GET /api/v1/topics - all topics with per-difficulty quiz counts.
pub async fn list_topics(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let all_topics: Vec<Topic> = topics(&state)
        .find(doc! {})
        .sort(doc! { "name": 1 })
        .await?
        .try_collect()
        .await?;

    let mut views = Vec::with_capacity(all_topics.len());
    for topic in &all_topics {
        let stats = topic_stats(&state, topic.id).await?;
        views.push(TopicView {
            id: topic.id.to_hex(),
            name: topic.name.clone(),
            description: topic.description.clone(),
            created_at: topic.created_at,
            stats,
        });
    }

    Ok(Json(TopicListResponse { topics: views }))
}

/// POST /api/v1/topics - admin only.
pub async fn create_topic(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<TopicPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| ApiError::validation(format!("Validation error: {}", e)))?;

    let topic = Topic {
        id: ObjectId::new(),
        name: payload.name,
        description: payload.description,
        created_at: Utc::now(),
    };

    if let Err(err) = topics(&state).insert_one(&topic).await {
        if is_duplicate_key(&err) {
            return Err(ApiError::conflict("A topic with this name already exists"));
        }
        return Err(err.into());
    }

    tracing::info!("Topic created: {} ({})", topic.name, topic.id);

    Ok((StatusCode::CREATED, Json(TopicBrief::from(&topic))))
}

/// PUT /api/v1/topics/{id} - admin only.
pub async fn update_topic(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(payload): AppJson<TopicPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| ApiError::validation(format!("Validation error: {}", e)))?;

    let topic_id = parse_object_id(&id, "topic")?;

    let update = doc! {
        "$set": { "name": &payload.name, "description": &payload.description }
    };

    let result = match topics(&state)
        .update_one(doc! { "_id": topic_id }, update)
        .await
    {
        Ok(result) => result,
        Err(err) if is_duplicate_key(&err) => {
            return Err(ApiError::conflict("A topic with this name already exists"));
        }
        Err(err) => return Err(err.into()),
    };

    if result.matched_count == 0 {
        return Err(ApiError::not_found("Topic not found"));
    }

    let topic = topics(&state)
        .find_one(doc! { "_id": topic_id })
        .await?
        .ok_or_else(|| ApiError::not_found("Topic not found"))?;

    Ok(Json(TopicBrief::from(&topic)))
}

/// DELETE /api/v1/topics/{id} - admin only; refused while quizzes reference
/// the topic.
pub async fn delete_topic(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let topic_id = parse_object_id(&id, "topic")?;

    let topic = topics(&state)
        .find_one(doc! { "_id": topic_id })
        .await?
        .ok_or_else(|| ApiError::not_found("Topic not found"))?;

    let quiz_count = state
        .mongo
        .collection::<Quiz>("quizzes")
        .count_documents(doc! { "topic_id": topic_id })
        .await?;
    if quiz_count > 0 {
        return Err(ApiError::validation(
            "Cannot delete topic with existing quizzes",
        ));
    }

    topics(&state).delete_one(doc! { "_id": topic_id }).await?;
    tracing::info!("Topic deleted: {} ({})", topic.name, topic.id);

    Ok(StatusCode::NO_CONTENT)
}

async fn topic_stats(state: &AppState, topic_id: ObjectId) -> Result<TopicStats, ApiError> {
    let quizzes = state.mongo.collection::<Quiz>("quizzes");

    let total_quizzes = quizzes
        .count_documents(doc! { "topic_id": topic_id })
        .await?;

    let pipeline = vec![
        doc! { "$match": { "topic_id": topic_id } },
        doc! { "$group": { "_id": "$difficulty", "count": { "$sum": 1 } } },
    ];

    let mut difficulties = DifficultyCounts::default();
    let mut cursor = quizzes.aggregate(pipeline).await?;
    while let Some(row) = cursor.try_next().await? {
        let count = difficulty_count(&row);
        match row.get_str("_id") {
            Ok("EASY") => difficulties.easy = count,
            Ok("MEDIUM") => difficulties.medium = count,
            Ok("HARD") => difficulties.hard = count,
            _ => {}
        }
    }

    Ok(TopicStats {
        total_quizzes,
        difficulties,
    })
}

fn difficulty_count(row: &Document) -> u64 {
    row.get_i32("count").map(|c| c as u64).unwrap_or_default()
}
