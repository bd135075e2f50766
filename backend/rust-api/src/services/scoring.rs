use mongodb::bson::oid::ObjectId;
use thiserror::Error;

use crate::models::attempt::AnswerRecord;
use crate::models::quiz::Question;

/// Scoring failures are unrecoverable input errors: a partially corrupt
/// submission must fail whole rather than silently under-score the user.
#[derive(Debug, Error, PartialEq)]
pub enum ScoringError {
    #[error("All questions must be answered")]
    AnswerCountMismatch { expected: usize, got: usize },
    #[error("Unknown question id {0}")]
    UnknownQuestion(ObjectId),
    #[error("Unknown option id {option_id} for question {question_id}")]
    UnknownOption {
        question_id: ObjectId,
        option_id: ObjectId,
    },
}

#[derive(Debug)]
pub struct ScoredSubmission {
    /// Percentage in [0, 100], rounded to the nearest integer.
    pub score: i32,
    pub correct_count: usize,
    pub answers: Vec<AnswerRecord>,
}

/// Pure scoring over in-memory data: no lookups, no side effects.
///
/// Each submitted pair is matched by identity against the quiz's questions
/// and that question's options. A question counts as correct iff the
/// selected option's correctness flag is set. The percentage is rounded half
/// away from zero (`f64::round`), i.e. half-up over this non-negative domain.
pub fn score_submission(
    questions: &[Question],
    answers: &[(ObjectId, ObjectId)],
) -> Result<ScoredSubmission, ScoringError> {
    if answers.len() != questions.len() {
        return Err(ScoringError::AnswerCountMismatch {
            expected: questions.len(),
            got: answers.len(),
        });
    }

    let mut correct_count = 0;
    let mut records = Vec::with_capacity(answers.len());

    for &(question_id, selected_option_id) in answers {
        let question = questions
            .iter()
            .find(|q| q.id == question_id)
            .ok_or(ScoringError::UnknownQuestion(question_id))?;

        let option = question
            .options
            .iter()
            .find(|o| o.id == selected_option_id)
            .ok_or(ScoringError::UnknownOption {
                question_id,
                option_id: selected_option_id,
            })?;

        if option.is_correct {
            correct_count += 1;
        }

        records.push(AnswerRecord {
            question_id,
            selected_option_id,
            is_correct: option.is_correct,
            explanation: question.explanation.clone(),
        });
    }

    Ok(ScoredSubmission {
        score: percentage(correct_count, questions.len()),
        correct_count,
        answers: records,
    })
}

fn percentage(correct: usize, total: usize) -> i32 {
    if total == 0 {
        return 0;
    }
    ((correct as f64 / total as f64) * 100.0).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::quiz::QuizOption;

    fn make_question(correct_index: usize, option_count: usize) -> Question {
        Question {
            id: ObjectId::new(),
            text: "q".to_string(),
            options: (0..option_count)
                .map(|i| QuizOption {
                    id: ObjectId::new(),
                    text: format!("option {}", i),
                    is_correct: i == correct_index,
                })
                .collect(),
            explanation: "because".to_string(),
        }
    }

    fn answer(question: &Question, option_index: usize) -> (ObjectId, ObjectId) {
        (question.id, question.options[option_index].id)
    }

    #[test]
    fn all_correct_scores_100() {
        let questions: Vec<_> = (0..4).map(|_| make_question(0, 3)).collect();
        let answers: Vec<_> = questions.iter().map(|q| answer(q, 0)).collect();

        let scored = score_submission(&questions, &answers).unwrap();
        assert_eq!(scored.score, 100);
        assert_eq!(scored.correct_count, 4);
        assert!(scored.answers.iter().all(|a| a.is_correct));
    }

    #[test]
    fn all_wrong_scores_0() {
        let questions: Vec<_> = (0..4).map(|_| make_question(0, 3)).collect();
        let answers: Vec<_> = questions.iter().map(|q| answer(q, 1)).collect();

        let scored = score_submission(&questions, &answers).unwrap();
        assert_eq!(scored.score, 0);
        assert_eq!(scored.correct_count, 0);
    }

    #[test]
    fn one_of_three_rounds_to_33() {
        let questions: Vec<_> = (0..3).map(|_| make_question(0, 2)).collect();
        let answers = vec![
            answer(&questions[0], 0),
            answer(&questions[1], 1),
            answer(&questions[2], 1),
        ];

        let scored = score_submission(&questions, &answers).unwrap();
        assert_eq!(scored.score, 33);
    }

    #[test]
    fn two_of_three_rounds_to_67() {
        let questions: Vec<_> = (0..3).map(|_| make_question(0, 2)).collect();
        let answers = vec![
            answer(&questions[0], 0),
            answer(&questions[1], 0),
            answer(&questions[2], 1),
        ];

        let scored = score_submission(&questions, &answers).unwrap();
        assert_eq!(scored.score, 67);
    }

    #[test]
    fn exact_half_rounds_up() {
        // 1 of 8 = 12.5% -> 13 under half-up rounding.
        let questions: Vec<_> = (0..8).map(|_| make_question(0, 2)).collect();
        let answers: Vec<_> = questions
            .iter()
            .enumerate()
            .map(|(i, q)| answer(q, if i == 0 { 0 } else { 1 }))
            .collect();

        let scored = score_submission(&questions, &answers).unwrap();
        assert_eq!(scored.score, 13);
    }

    #[test]
    fn count_mismatch_fails() {
        let questions: Vec<_> = (0..3).map(|_| make_question(0, 2)).collect();
        let answers = vec![answer(&questions[0], 0)];

        let err = score_submission(&questions, &answers).unwrap_err();
        assert_eq!(
            err,
            ScoringError::AnswerCountMismatch {
                expected: 3,
                got: 1
            }
        );
    }

    #[test]
    fn unknown_question_fails_whole_submission() {
        let questions = vec![make_question(0, 2)];
        let bogus = ObjectId::new();
        let answers = vec![(bogus, questions[0].options[0].id)];

        let err = score_submission(&questions, &answers).unwrap_err();
        assert_eq!(err, ScoringError::UnknownQuestion(bogus));
    }

    #[test]
    fn unknown_option_fails_whole_submission() {
        let questions = vec![make_question(0, 2)];
        let bogus = ObjectId::new();
        let answers = vec![(questions[0].id, bogus)];

        assert!(matches!(
            score_submission(&questions, &answers),
            Err(ScoringError::UnknownOption { .. })
        ));
    }

    #[test]
    fn answers_snapshot_explanation() {
        let questions = vec![make_question(0, 2)];
        let answers = vec![answer(&questions[0], 0)];

        let scored = score_submission(&questions, &answers).unwrap();
        assert_eq!(scored.answers[0].explanation, "because");
    }

    #[test]
    fn multiple_correct_options_each_count() {
        // Nothing forbids several options being flagged correct; any of them
        // earns the point.
        let mut question = make_question(0, 3);
        question.options[2].is_correct = true;
        let answers = vec![(question.id, question.options[2].id)];

        let scored = score_submission(std::slice::from_ref(&question), &answers).unwrap();
        assert_eq!(scored.score, 100);
    }
}
