use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use mongodb::{bson::doc, bson::oid::ObjectId, Collection};
use std::sync::Arc;
use validator::Validate;

use crate::{
    error::{is_duplicate_key, ApiError},
    extractors::AppJson,
    handlers::claims_user_id,
    middlewares::auth::{JwtClaims, JwtService},
    models::user::{AuthResponse, LoginRequest, RegisterRequest, User, UserProfile, UserRole},
    services::AppState,
};

fn users(state: &AppState) -> Collection<User> {
    state.mongo.collection("users")
}

/// POST /api/v1/auth/register - Register a new user
pub async fn register(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()
        .map_err(|e| ApiError::validation(format!("Validation error: {}", e)))?;

    tracing::info!("Registering new user: {}", req.email);

    let password_hash = hash(&req.password, DEFAULT_COST).context("Failed to hash password")?;

    let user = User {
        id: ObjectId::new(),
        name: req.name,
        email: req.email.to_lowercase(),
        password_hash,
        role: UserRole::User,
        created_at: Utc::now(),
    };

    if let Err(err) = users(&state).insert_one(&user).await {
        if is_duplicate_key(&err) {
            return Err(ApiError::conflict("Email already in use"));
        }
        return Err(err.into());
    }

    let token = JwtService::new(&state.config.jwt_secret)
        .issue_token(&user.id.to_hex(), user.role)
        .context("Failed to issue access token")?;

    tracing::info!("User registered successfully: {}", user.id);

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            access_token: token,
            user: UserProfile::from(&user),
        }),
    ))
}

/// POST /api/v1/auth/login - Login with email and password
pub async fn login(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()
        .map_err(|e| ApiError::validation(format!("Validation error: {}", e)))?;

    let user = users(&state)
        .find_one(doc! { "email": req.email.to_lowercase() })
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid email or password".to_string()))?;

    let password_matches =
        verify(&req.password, &user.password_hash).context("Failed to verify password")?;
    if !password_matches {
        tracing::warn!("Failed login attempt for {}", user.email);
        return Err(ApiError::Unauthorized(
            "Invalid email or password".to_string(),
        ));
    }

    let token = JwtService::new(&state.config.jwt_secret)
        .issue_token(&user.id.to_hex(), user.role)
        .context("Failed to issue access token")?;

    tracing::info!("User logged in: {}", user.id);

    Ok(Json(AuthResponse {
        access_token: token,
        user: UserProfile::from(&user),
    }))
}

/// GET /api/v1/auth/me - Current user from the access token
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims_user_id(&claims)?;

    let user = users(&state)
        .find_one(doc! { "_id": user_id })
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(UserProfile::from(&user)))
}
