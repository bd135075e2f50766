use chrono::Utc;
use mongodb::{
    bson::{doc, oid::ObjectId},
    Collection, Database,
};

use crate::error::{is_duplicate_key, ApiError};
use crate::metrics::{
    ATTEMPTS_SUBMITTED_TOTAL, OUTCOME_ACCEPTED, OUTCOME_COOLDOWN, OUTCOME_REJECTED,
};
use crate::models::attempt::{
    AnswerDetail, AttemptRecord, SubmitAttemptRequest, SubmitAttemptResponse, SubmittedAnswer,
};
use crate::models::quiz::Quiz;
use crate::services::{cooldown, scoring};

/// The single write path turning a validated submission into a persisted
/// attempt. Everything before the insert is pure computation or read-only
/// lookup; on any failure no attempt is written.
pub struct AttemptService {
    mongo: Database,
}

impl AttemptService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn quizzes(&self) -> Collection<Quiz> {
        self.mongo.collection("quizzes")
    }

    fn results(&self) -> Collection<AttemptRecord> {
        self.mongo.collection("results")
    }

    pub async fn load_quiz(&self, quiz_id: ObjectId) -> Result<Quiz, ApiError> {
        self.quizzes()
            .find_one(doc! { "_id": quiz_id })
            .await?
            .ok_or_else(|| ApiError::not_found("Quiz not found"))
    }

    /// Latest attempt for the pair: completion time descending, `_id`
    /// descending as the deterministic tie-break for colliding timestamps.
    pub async fn latest_attempt(
        &self,
        user_id: ObjectId,
        quiz_id: ObjectId,
    ) -> Result<Option<AttemptRecord>, ApiError> {
        let attempt = self
            .results()
            .find_one(doc! { "user_id": user_id, "quiz_id": quiz_id })
            .sort(doc! { "completed_at": -1, "_id": -1 })
            .await?;
        Ok(attempt)
    }

    pub async fn cooldown_status(
        &self,
        user_id: ObjectId,
        quiz_id: ObjectId,
    ) -> Result<cooldown::CooldownStatus, ApiError> {
        let latest = self.latest_attempt(user_id, quiz_id).await?;
        Ok(cooldown::evaluate(latest.as_ref(), Utc::now()))
    }

    pub async fn submit(
        &self,
        user_id: ObjectId,
        quiz_id: ObjectId,
        req: &SubmitAttemptRequest,
    ) -> Result<SubmitAttemptResponse, ApiError> {
        tracing::info!(
            "Processing attempt submission: user={}, quiz={}, answers={}",
            user_id,
            quiz_id,
            req.answers.len()
        );

        let quiz = self.load_quiz(quiz_id).await?;

        // Count precondition comes before the cooldown check: an incomplete
        // submission is a validation failure no matter the attempt window.
        if req.answers.len() != quiz.questions.len() {
            ATTEMPTS_SUBMITTED_TOTAL
                .with_label_values(&[OUTCOME_REJECTED])
                .inc();
            return Err(ApiError::validation("All questions must be answered"));
        }

        let answers = parse_answer_ids(&req.answers).inspect_err(|_| {
            ATTEMPTS_SUBMITTED_TOTAL
                .with_label_values(&[OUTCOME_REJECTED])
                .inc();
        })?;

        let latest = self.latest_attempt(user_id, quiz_id).await?;
        let status = cooldown::evaluate(latest.as_ref(), Utc::now());
        if let (false, Some(next_attempt_at)) = (status.can_attempt, status.next_attempt_at) {
            ATTEMPTS_SUBMITTED_TOTAL
                .with_label_values(&[OUTCOME_COOLDOWN])
                .inc();
            tracing::info!(
                "Attempt blocked by cooldown: user={}, quiz={}, next={}",
                user_id,
                quiz_id,
                next_attempt_at
            );
            return Err(ApiError::Cooldown { next_attempt_at });
        }

        let scored = scoring::score_submission(&quiz.questions, &answers).map_err(|e| {
            ATTEMPTS_SUBMITTED_TOTAL
                .with_label_values(&[OUTCOME_REJECTED])
                .inc();
            ApiError::validation(e.to_string())
        })?;

        let completed_at = Utc::now();
        let attempt = AttemptRecord {
            id: ObjectId::new(),
            user_id,
            quiz_id,
            answers: scored.answers,
            score: scored.score,
            time_spent: req.time_spent,
            completed_at,
            next_attempt_allowed: cooldown::next_attempt_allowed(
                completed_at,
                quiz.cooldown_hours,
            ),
            previous_attempt_id: latest.map(|a| a.id),
        };

        // Atomic single-document creation. Two submissions racing past the
        // eligibility check record the same predecessor, and the unique
        // (user_id, quiz_id, previous_attempt_id) index fails the loser.
        if let Err(err) = self.results().insert_one(&attempt).await {
            if is_duplicate_key(&err) {
                ATTEMPTS_SUBMITTED_TOTAL
                    .with_label_values(&[OUTCOME_REJECTED])
                    .inc();
                tracing::warn!(
                    "Concurrent submission detected: user={}, quiz={}",
                    user_id,
                    quiz_id
                );
                return Err(ApiError::conflict(
                    "Another submission for this quiz was recorded concurrently; retry",
                ));
            }
            return Err(err.into());
        }

        ATTEMPTS_SUBMITTED_TOTAL
            .with_label_values(&[OUTCOME_ACCEPTED])
            .inc();
        tracing::info!(
            "Attempt recorded: user={}, quiz={}, score={}",
            user_id,
            quiz_id,
            attempt.score
        );

        Ok(SubmitAttemptResponse {
            score: attempt.score,
            correct_answers: scored.correct_count,
            total_questions: quiz.questions.len(),
            time_spent: req.time_spent,
            detailed_results: attempt.answers.iter().map(AnswerDetail::from).collect(),
        })
    }
}

/// Parses the submitted hex ids. A malformed id is a `ValidationError`, same
/// as an unknown one: the whole submission fails.
fn parse_answer_ids(answers: &[SubmittedAnswer]) -> Result<Vec<(ObjectId, ObjectId)>, ApiError> {
    answers
        .iter()
        .map(|a| {
            let question_id = ObjectId::parse_str(&a.question_id)
                .map_err(|_| ApiError::validation(format!("Invalid question id: {}", a.question_id)))?;
            let option_id = ObjectId::parse_str(&a.selected_option_id).map_err(|_| {
                ApiError::validation(format!("Invalid option id: {}", a.selected_option_id))
            })?;
            Ok((question_id, option_id))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_answer_ids_accepts_valid_hex() {
        let answers = vec![SubmittedAnswer {
            question_id: ObjectId::new().to_hex(),
            selected_option_id: ObjectId::new().to_hex(),
        }];
        assert_eq!(parse_answer_ids(&answers).unwrap().len(), 1);
    }

    #[test]
    fn parse_answer_ids_rejects_malformed_hex() {
        let answers = vec![SubmittedAnswer {
            question_id: "not-hex".to_string(),
            selected_option_id: ObjectId::new().to_hex(),
        }];
        assert!(matches!(
            parse_answer_ids(&answers),
            Err(ApiError::Validation(_))
        ));
    }
}
