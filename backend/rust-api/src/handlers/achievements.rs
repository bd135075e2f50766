use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Extension, Json};

use crate::{
    error::ApiError,
    handlers::claims_user_id,
    middlewares::auth::JwtClaims,
    models::achievement::{AchievementProgressView, AchievementView, UnlockedAchievementView},
    services::{achievement_service::AchievementService, AppState},
};

/// GET /api/v1/achievements - the caller's unlocked achievements, most
/// recently unlocked first.
pub async fn list_unlocked(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims_user_id(&claims)?;

    let service = AchievementService::new(state.mongo.clone(), state.achievements.clone());
    let unlocks = service.unlocked_for(user_id).await?;

    // Unlocks referencing entries removed from the catalog are skipped.
    let views: Vec<UnlockedAchievementView> = unlocks
        .iter()
        .filter_map(|unlock| {
            let achievement = state.achievements.find(unlock.achievement_id)?;
            Some(UnlockedAchievementView {
                achievement: AchievementView::from(achievement),
                unlocked_at: unlock.unlocked_at,
                progress: unlock.progress,
            })
        })
        .collect();

    Ok(Json(views))
}

/// GET /api/v1/achievements/progress - the whole catalog, annotated with the
/// recorded unlock state or the live progress. Progress is computed the same
/// way for all four rule types.
pub async fn progress(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims_user_id(&claims)?;

    let service = AchievementService::new(state.mongo.clone(), state.achievements.clone());
    let unlocks = service.unlocked_for(user_id).await?;

    let mut views = Vec::with_capacity(state.achievements.len());
    for achievement in state.achievements.iter() {
        let unlock = unlocks
            .iter()
            .find(|u| u.achievement_id == achievement.id);

        let view = match unlock {
            Some(unlock) => AchievementProgressView {
                achievement: AchievementView::from(achievement),
                unlocked: true,
                progress: unlock.progress,
                unlocked_at: Some(unlock.unlocked_at),
            },
            None => AchievementProgressView {
                achievement: AchievementView::from(achievement),
                unlocked: false,
                progress: service.progress(user_id, achievement.kind).await?,
                unlocked_at: None,
            },
        };
        views.push(view);
    }

    Ok(Json(views))
}
