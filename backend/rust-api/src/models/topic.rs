use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    pub description: String,
    #[serde(with = "crate::utils::time::bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

/// Create/update payload shared by both admin endpoints.
#[derive(Debug, Deserialize, Validate)]
pub struct TopicPayload {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 500, message = "Description must be 1-500 characters"))]
    pub description: String,
}

#[derive(Debug, Default, Serialize)]
pub struct DifficultyCounts {
    pub easy: u64,
    pub medium: u64,
    pub hard: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicStats {
    pub total_quizzes: u64,
    pub difficulties: DifficultyCounts,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub stats: TopicStats,
}
