use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Snapshot of a single answered question, embedded in the attempt.
///
/// `is_correct` and `explanation` are copied from the quiz at submission
/// time: the attempt stays a faithful historical record even if the quiz's
/// answer key is edited later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: ObjectId,
    pub selected_option_id: ObjectId,
    pub is_correct: bool,
    pub explanation: String,
}

/// One scored submission of a quiz by a user. Append-only; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub user_id: ObjectId,
    pub quiz_id: ObjectId,
    pub answers: Vec<AnswerRecord>,
    pub score: i32,
    pub time_spent: i64,
    #[serde(with = "crate::utils::time::bson_datetime_as_chrono")]
    pub completed_at: DateTime<Utc>,
    #[serde(with = "crate::utils::time::bson_datetime_as_chrono")]
    pub next_attempt_allowed: DateTime<Utc>,
    /// The latest attempt observed during the eligibility check (None for a
    /// first attempt). A unique index on (user_id, quiz_id,
    /// previous_attempt_id) makes the check-and-insert race lose cleanly:
    /// only one submission can succeed a given predecessor.
    pub previous_attempt_id: Option<ObjectId>,
}

impl AttemptRecord {
    pub fn correct_count(&self) -> usize {
        self.answers.iter().filter(|a| a.is_correct).count()
    }
}

// ---------------------------------------------------------------------------
// Wire DTOs

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAnswer {
    pub question_id: String,
    pub selected_option_id: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAttemptRequest {
    pub answers: Vec<SubmittedAnswer>,
    #[validate(range(min = 0, message = "Time spent must be a positive number"))]
    pub time_spent: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerDetail {
    pub question_id: String,
    pub selected_option_id: String,
    pub is_correct: bool,
    pub explanation: String,
}

impl From<&AnswerRecord> for AnswerDetail {
    fn from(record: &AnswerRecord) -> Self {
        Self {
            question_id: record.question_id.to_hex(),
            selected_option_id: record.selected_option_id.to_hex(),
            is_correct: record.is_correct,
            explanation: record.explanation.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAttemptResponse {
    pub score: i32,
    pub correct_answers: usize,
    pub total_questions: usize,
    pub time_spent: i64,
    pub detailed_results: Vec<AnswerDetail>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptResultResponse {
    pub score: i32,
    pub correct_answers: usize,
    pub total_questions: usize,
    pub time_spent: i64,
    pub completed_at: DateTime<Utc>,
    pub detailed_results: Vec<AnswerDetail>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CooldownStatusResponse {
    pub can_attempt: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,
}
