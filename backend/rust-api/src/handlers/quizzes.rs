use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Extension, Json,
};
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId};
use printpdf::{
    BuiltinFont, Color, Greyscale, Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, Point, Pt, Rgb,
    TextItem,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    error::ApiError,
    extractors::{AppJson, OptionalClaims},
    handlers::{claims_user_id, parse_object_id},
    metrics::RESULT_EXPORTS_TOTAL,
    middlewares::auth::JwtClaims,
    models::{
        attempt::{
            AnswerDetail, AttemptRecord, AttemptResultResponse, CooldownStatusResponse,
            SubmitAttemptRequest,
        },
        quiz::{Difficulty, Quiz, QuizDetail, QuizSummary, TopicRef, UserQuizStatus},
        topic::Topic,
        PageQuery,
    },
    services::{
        achievement_service::AchievementService, attempt_service::AttemptService, AppState,
    },
};

#[derive(Debug, Deserialize)]
pub struct QuizListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub topic: Option<String>,
    pub difficulty: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizListResponse {
    pub quizzes: Vec<QuizSummary>,
    pub total: u64,
    pub page: i64,
    pub total_pages: u64,
}

/// GET /api/v1/quizzes - browse quizzes with filters and pagination.
/// Answer keys are never included in listings.
pub async fn list_quizzes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<QuizListQuery>,
    OptionalClaims(claims): OptionalClaims,
) -> Result<impl IntoResponse, ApiError> {
    let (page, limit, skip) = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .resolve();

    let mut filter = doc! {};

    if let Some(topic) = &query.topic {
        let topic_doc = state
            .mongo
            .collection::<Topic>("topics")
            .find_one(doc! { "name": { "$regex": topic, "$options": "i" } })
            .await?;
        if let Some(topic_doc) = topic_doc {
            filter.insert("topic_id", topic_doc.id);
        }
    }

    if let Some(difficulty) = query.difficulty.as_deref().and_then(Difficulty::parse) {
        filter.insert("difficulty", difficulty.as_str());
    }

    if let Some(search) = &query.search {
        filter.insert(
            "$or",
            vec![
                doc! { "title": { "$regex": search, "$options": "i" } },
                doc! { "description": { "$regex": search, "$options": "i" } },
            ],
        );
    }

    let quizzes_collection = state.mongo.collection::<Quiz>("quizzes");

    let total = quizzes_collection.count_documents(filter.clone()).await?;

    let quizzes: Vec<Quiz> = quizzes_collection
        .find(filter)
        .sort(doc! { "created_at": -1 })
        .skip(skip)
        .limit(limit)
        .await?
        .try_collect()
        .await?;

    let topics = load_topic_refs(&state, &quizzes).await?;

    let user_id = match &claims {
        Some(claims) => Some(claims_user_id(claims)?),
        None => None,
    };
    let attempt_service = AttemptService::new(state.mongo.clone());

    let mut summaries = Vec::with_capacity(quizzes.len());
    for quiz in &quizzes {
        let user_status = match user_id {
            Some(user_id) => Some(user_status_for(&attempt_service, user_id, quiz.id).await?),
            None => None,
        };
        summaries.push(quiz.summary(topics.get(&quiz.topic_id).cloned(), user_status));
    }

    Ok(Json(QuizListResponse {
        quizzes: summaries,
        total,
        page,
        total_pages: PageQuery::total_pages(total, limit),
    }))
}

/// GET /api/v1/quizzes/{id} - quiz detail. The answer key and explanations
/// stay hidden whenever the caller could still attempt the quiz (and always
/// for anonymous callers); a user inside the cooldown window sees them for
/// review.
pub async fn get_quiz(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    OptionalClaims(claims): OptionalClaims,
) -> Result<impl IntoResponse, ApiError> {
    let quiz_id = parse_object_id(&id, "quiz")?;

    let attempt_service = AttemptService::new(state.mongo.clone());
    let quiz = attempt_service.load_quiz(quiz_id).await?;

    let topic = state
        .mongo
        .collection::<Topic>("topics")
        .find_one(doc! { "_id": quiz.topic_id })
        .await?
        .map(|t| TopicRef {
            id: t.id.to_hex(),
            name: t.name,
        });

    let (user_status, reveal_key) = match &claims {
        Some(claims) => {
            let user_id = claims_user_id(claims)?;
            let status = user_status_for(&attempt_service, user_id, quiz.id).await?;
            let reveal = status.has_attempted && !status.can_attempt;
            (Some(status), reveal)
        }
        None => (None, false),
    };

    let questions = quiz.question_views(reveal_key);
    Ok(Json(QuizDetail {
        summary: quiz.summary(topic, user_status),
        questions,
    }))
}

/// POST /api/v1/quizzes/{id}/submit - the core write path. On success the
/// achievement engine re-evaluates the user as a follow-up action; its
/// failure never fails the submission.
pub async fn submit_attempt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<SubmitAttemptRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()
        .map_err(|e| ApiError::validation(format!("Validation error: {}", e)))?;

    let quiz_id = parse_object_id(&id, "quiz")?;
    let user_id = claims_user_id(&claims)?;

    let attempt_service = AttemptService::new(state.mongo.clone());
    let response = attempt_service.submit(user_id, quiz_id, &req).await?;

    let achievement_service =
        AchievementService::new(state.mongo.clone(), state.achievements.clone());
    match achievement_service.evaluate_user(user_id).await {
        Ok(unlocked) if !unlocked.is_empty() => {
            tracing::info!(
                "User {} unlocked {} achievement(s) after submission",
                user_id,
                unlocked.len()
            );
        }
        Ok(_) => {}
        Err(err) => {
            tracing::warn!("Achievement evaluation failed for user {}: {}", user_id, err);
        }
    }

    Ok(Json(response))
}

/// GET /api/v1/quizzes/{id}/results - the caller's latest result.
pub async fn get_results(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let quiz_id = parse_object_id(&id, "quiz")?;
    let user_id = claims_user_id(&claims)?;

    let attempt = AttemptService::new(state.mongo.clone())
        .latest_attempt(user_id, quiz_id)
        .await?
        .ok_or_else(|| ApiError::not_found("No results found"))?;

    Ok(Json(AttemptResultResponse {
        score: attempt.score,
        correct_answers: attempt.correct_count(),
        total_questions: attempt.answers.len(),
        time_spent: attempt.time_spent,
        completed_at: attempt.completed_at,
        detailed_results: attempt.answers.iter().map(AnswerDetail::from).collect(),
    }))
}

/// GET /api/v1/quizzes/{id}/cooldown
pub async fn cooldown_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let quiz_id = parse_object_id(&id, "quiz")?;
    let user_id = claims_user_id(&claims)?;

    let status = AttemptService::new(state.mongo.clone())
        .cooldown_status(user_id, quiz_id)
        .await?;

    Ok(Json(CooldownStatusResponse {
        can_attempt: status.can_attempt,
        next_attempt_at: status.next_attempt_at,
    }))
}

/// POST /api/v1/quizzes/{id}/export - latest result as a PDF report.
pub async fn export_results(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let quiz_id = parse_object_id(&id, "quiz")?;
    let user_id = claims_user_id(&claims)?;

    let attempt_service = AttemptService::new(state.mongo.clone());
    let quiz = attempt_service.load_quiz(quiz_id).await?;
    let attempt = attempt_service
        .latest_attempt(user_id, quiz_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Result not found"))?;

    let bytes = build_result_pdf(&quiz, &attempt);

    RESULT_EXPORTS_TOTAL.with_label_values(&["pdf"]).inc();
    tracing::info!("Result PDF exported: user={}, quiz={}", user_id, quiz_id);

    let headers = [
        (header::CONTENT_TYPE, "application/pdf".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=quiz-result-{}.pdf", quiz.id.to_hex()),
        ),
    ];

    Ok((headers, bytes))
}

async fn load_topic_refs(
    state: &AppState,
    quizzes: &[Quiz],
) -> Result<HashMap<ObjectId, TopicRef>, ApiError> {
    let topic_ids: Vec<ObjectId> = quizzes.iter().map(|q| q.topic_id).collect();
    if topic_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let topics: Vec<Topic> = state
        .mongo
        .collection::<Topic>("topics")
        .find(doc! { "_id": { "$in": topic_ids } })
        .await?
        .try_collect()
        .await?;

    Ok(topics
        .into_iter()
        .map(|t| {
            (
                t.id,
                TopicRef {
                    id: t.id.to_hex(),
                    name: t.name,
                },
            )
        })
        .collect())
}

async fn user_status_for(
    attempt_service: &AttemptService,
    user_id: ObjectId,
    quiz_id: ObjectId,
) -> Result<UserQuizStatus, ApiError> {
    let latest = attempt_service.latest_attempt(user_id, quiz_id).await?;
    let status = crate::services::cooldown::evaluate(latest.as_ref(), chrono::Utc::now());

    Ok(UserQuizStatus {
        has_attempted: latest.is_some(),
        last_score: latest.map(|a| a.score),
        can_attempt: status.can_attempt,
        next_attempt_at: status.next_attempt_at,
    })
}

// ---------------------------------------------------------------------------
// PDF report

fn build_result_pdf(quiz: &Quiz, attempt: &AttemptRecord) -> Vec<u8> {
    let mut document = PdfDocument::new("Quiz Results");
    let mut ops = Vec::new();

    let accent_color = Color::Rgb(Rgb {
        r: 0.16,
        g: 0.4,
        b: 0.69,
        icc_profile: None,
    });
    let text_color = Color::Greyscale(Greyscale::new(0.08, None));

    push_pdf_text(
        &mut ops,
        Point::new(Mm(20.0), Mm(275.0)),
        BuiltinFont::HelveticaBold,
        18.0,
        22.0,
        "Quiz Results".to_string(),
        &accent_color,
    );

    let lines = [
        format!("Quiz: {}", quiz.title),
        format!("Score: {}%", attempt.score),
        format!(
            "Correct Answers: {}/{}",
            attempt.correct_count(),
            attempt.answers.len()
        ),
        format!(
            "Time Spent: {}m {}s",
            attempt.time_spent / 60,
            attempt.time_spent % 60
        ),
        format!(
            "Completed: {}",
            attempt.completed_at.format("%Y-%m-%d %H:%M UTC")
        ),
    ];

    let mut y = 258.0_f32;
    for line in lines {
        push_pdf_text(
            &mut ops,
            Point::new(Mm(20.0), Mm(y)),
            BuiltinFont::Helvetica,
            12.0,
            15.0,
            line,
            &text_color,
        );
        y -= 9.0;
    }

    let page = PdfPage::new(Mm(210.0), Mm(297.0), ops);
    let mut warnings = Vec::new();
    document
        .with_pages(vec![page])
        .save(&PdfSaveOptions::default(), &mut warnings)
}

fn push_pdf_text(
    ops: &mut Vec<Op>,
    pos: Point,
    font: BuiltinFont,
    font_size: f32,
    line_height: f32,
    text: String,
    color: &Color,
) {
    ops.extend([
        Op::StartTextSection,
        Op::SetTextCursor { pos },
        Op::SetFontSizeBuiltinFont {
            size: Pt(font_size),
            font,
        },
        Op::SetLineHeight {
            lh: Pt(line_height),
        },
        Op::SetFillColor { col: color.clone() },
        Op::WriteTextBuiltinFont {
            items: vec![TextItem::Text(text)],
            font,
        },
        Op::EndTextSection,
    ]);
}
