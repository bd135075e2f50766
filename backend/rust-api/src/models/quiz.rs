use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "EASY",
            Difficulty::Medium => "MEDIUM",
            Difficulty::Hard => "HARD",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "EASY" => Some(Difficulty::Easy),
            "MEDIUM" => Some(Difficulty::Medium),
            "HARD" => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizOption {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub text: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub text: String,
    pub options: Vec<QuizOption>,
    pub explanation: String,
}

/// Stored quiz document. Immutable reference for all attempts taken against
/// it; question and option ids are stable for the lifetime of the quiz.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub title: String,
    pub description: String,
    pub topic_id: ObjectId,
    pub difficulty: Difficulty,
    /// Minutes the taker has to finish.
    pub time_limit: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    pub questions: Vec<Question>,
    /// 0 means no cooldown.
    pub cooldown_hours: i64,
    #[serde(with = "crate::utils::time::bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    pub created_by: ObjectId,
}

// ---------------------------------------------------------------------------
// Authoring payloads (admin)

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct OptionPayload {
    #[validate(length(min = 1, message = "Option text is required"))]
    pub text: String,
    #[serde(rename = "isCorrect")]
    pub is_correct: bool,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct QuestionPayload {
    #[validate(length(min = 1, message = "Question text is required"))]
    pub text: String,
    #[validate(nested, length(min = 2, message = "At least 2 options are required"))]
    pub options: Vec<OptionPayload>,
    #[validate(length(min = 1, message = "Explanation is required"))]
    pub explanation: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct QuizPayload {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,
    pub topic_id: String,
    pub difficulty: Difficulty,
    #[validate(range(min = 1, message = "Time limit must be a positive number"))]
    pub time_limit: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[validate(range(min = 0, message = "Cooldown hours must not be negative"))]
    pub cooldown_hours: i64,
    #[validate(nested, length(min = 1, message = "Questions must not be empty"))]
    pub questions: Vec<QuestionPayload>,
}

impl QuizPayload {
    /// Materializes a stored quiz, minting fresh ids for every question and
    /// option.
    pub fn into_quiz(self, topic_id: ObjectId, created_by: ObjectId) -> Quiz {
        let questions = self
            .questions
            .into_iter()
            .map(|question| Question {
                id: ObjectId::new(),
                text: question.text,
                options: question
                    .options
                    .into_iter()
                    .map(|option| QuizOption {
                        id: ObjectId::new(),
                        text: option.text,
                        is_correct: option.is_correct,
                    })
                    .collect(),
                explanation: question.explanation,
            })
            .collect();

        Quiz {
            id: ObjectId::new(),
            title: self.title,
            description: self.description,
            topic_id,
            difficulty: self.difficulty,
            time_limit: self.time_limit,
            tags: self.tags,
            questions,
            cooldown_hours: self.cooldown_hours,
            created_at: Utc::now(),
            created_by,
        }
    }
}

// ---------------------------------------------------------------------------
// Read DTOs

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuizStatus {
    pub has_attempted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_score: Option<i32>,
    pub can_attempt: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionView {
    pub id: String,
    pub text: String,
    /// Omitted while the caller could still attempt the quiz.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub id: String,
    pub text: String,
    pub options: Vec<OptionView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSummary {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<TopicRef>,
    pub difficulty: Difficulty,
    pub time_limit: u32,
    pub tags: Vec<String>,
    pub cooldown_hours: i64,
    pub question_count: usize,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_status: Option<UserQuizStatus>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizDetail {
    #[serde(flatten)]
    pub summary: QuizSummary,
    pub questions: Vec<QuestionView>,
}

impl Quiz {
    pub fn summary(&self, topic: Option<TopicRef>, user_status: Option<UserQuizStatus>) -> QuizSummary {
        QuizSummary {
            id: self.id.to_hex(),
            title: self.title.clone(),
            description: self.description.clone(),
            topic,
            difficulty: self.difficulty,
            time_limit: self.time_limit,
            tags: self.tags.clone(),
            cooldown_hours: self.cooldown_hours,
            question_count: self.questions.len(),
            created_at: self.created_at,
            user_status,
        }
    }

    /// Question views for the API. When `reveal_key` is false the correctness
    /// flags and explanations are stripped (taking mode); when true they are
    /// included (review mode, after the caller's attempt is locked in).
    pub fn question_views(&self, reveal_key: bool) -> Vec<QuestionView> {
        self.questions
            .iter()
            .map(|question| QuestionView {
                id: question.id.to_hex(),
                text: question.text.clone(),
                options: question
                    .options
                    .iter()
                    .map(|option| OptionView {
                        id: option.id.to_hex(),
                        text: option.text.clone(),
                        is_correct: reveal_key.then_some(option.is_correct),
                    })
                    .collect(),
                explanation: reveal_key.then(|| question.explanation.clone()),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    fn sample_payload() -> QuizPayload {
        QuizPayload {
            title: "Ownership basics".to_string(),
            description: "Moves, borrows and lifetimes".to_string(),
            topic_id: ObjectId::new().to_hex(),
            difficulty: Difficulty::Easy,
            time_limit: 10,
            tags: vec![],
            cooldown_hours: 24,
            questions: vec![QuestionPayload {
                text: "What does a move do?".to_string(),
                options: vec![
                    OptionPayload {
                        text: "Transfers ownership".to_string(),
                        is_correct: true,
                    },
                    OptionPayload {
                        text: "Copies the value".to_string(),
                        is_correct: false,
                    },
                ],
                explanation: "A move transfers ownership of the value.".to_string(),
            }],
        }
    }

    #[test]
    fn payload_with_two_options_is_valid() {
        assert!(sample_payload().validate().is_ok());
    }

    #[test]
    fn payload_with_single_option_is_rejected() {
        let mut payload = sample_payload();
        payload.questions[0].options.pop();
        assert!(payload.validate().is_err());
    }

    #[test]
    fn payload_with_zero_time_limit_is_rejected() {
        let mut payload = sample_payload();
        payload.time_limit = 0;
        assert!(payload.validate().is_err());
    }

    #[test]
    fn into_quiz_mints_question_and_option_ids() {
        let payload = sample_payload();
        let quiz = payload.into_quiz(ObjectId::new(), ObjectId::new());
        assert_eq!(quiz.questions.len(), 1);
        assert_eq!(quiz.questions[0].options.len(), 2);
        assert_ne!(
            quiz.questions[0].options[0].id,
            quiz.questions[0].options[1].id
        );
    }

    #[test]
    fn question_views_strip_key_in_taking_mode() {
        let quiz = sample_payload().into_quiz(ObjectId::new(), ObjectId::new());

        let hidden = quiz.question_views(false);
        assert!(hidden[0].explanation.is_none());
        assert!(hidden[0].options.iter().all(|o| o.is_correct.is_none()));

        let revealed = quiz.question_views(true);
        assert_eq!(revealed[0].options[0].is_correct, Some(true));
        assert!(revealed[0].explanation.is_some());
    }

    #[test]
    fn difficulty_parse_is_case_insensitive() {
        assert_eq!(Difficulty::parse("easy"), Some(Difficulty::Easy));
        assert_eq!(Difficulty::parse("HARD"), Some(Difficulty::Hard));
        assert_eq!(Difficulty::parse("extreme"), None);
    }
}
