#![allow(dead_code)]

use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::AppState;

/// CSP middleware adds Content-Security-Policy header to all responses
async fn csp_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(
            "default-src 'self'; \
             script-src 'self' 'unsafe-inline'; \
             style-src 'self' 'unsafe-inline'; \
             img-src 'self' data: https:; \
             connect-src 'self'",
        ),
    );
    response
}

pub fn create_router(app_state: std::sync::Arc<services::AppState>) -> Router {
    let cors = {
        let layer = CorsLayer::new()
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

        let configured_origin = app_state
            .config
            .frontend_origin
            .as_deref()
            .and_then(|origin| origin.parse::<HeaderValue>().ok());
        match configured_origin {
            Some(origin) => layer.allow_origin(origin),
            None => layer.allow_origin(tower_http::cors::Any),
        }
    };

    Router::new()
        // Public endpoints (no auth required)
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        // Metrics endpoint with Basic Auth protection
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .nest("/api/v1/auth", auth_routes(app_state.clone()))
        .nest("/api/v1/quizzes", quiz_routes(app_state.clone()))
        .nest("/api/v1/topics", topic_routes(app_state.clone()))
        .nest(
            "/api/v1/user",
            user_routes().layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::auth::auth_middleware,
            )),
        )
        .nest("/api/v1/leaderboard", leaderboard_routes())
        .nest(
            "/api/v1/achievements",
            achievement_routes().layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::auth::auth_middleware,
            )),
        )
        .nest(
            "/api/v1/admin",
            admin_routes().layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::auth::auth_middleware,
            )),
        )
        .with_state(app_state)
        .layer(middleware::from_fn(csp_middleware)) // Apply CSP to all responses
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

fn auth_routes(
    app_state: std::sync::Arc<services::AppState>,
) -> Router<std::sync::Arc<services::AppState>> {
    let public_routes = Router::new()
        .route("/register", post(handlers::auth::register))
        .route("/login", post(handlers::auth::login));

    let protected_routes = Router::new()
        .route("/me", get(handlers::auth::me))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ));

    public_routes.merge(protected_routes)
}

fn quiz_routes(
    app_state: std::sync::Arc<services::AppState>,
) -> Router<std::sync::Arc<services::AppState>> {
    // Browsing works without a session; attempt status is added when a valid
    // token is present.
    let browse_routes = Router::new()
        .route("/", get(handlers::quizzes::list_quizzes))
        .route("/{id}", get(handlers::quizzes::get_quiz))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::auth::optional_auth_middleware,
        ));

    let attempt_routes = Router::new()
        .route("/{id}/submit", post(handlers::quizzes::submit_attempt))
        .route("/{id}/results", get(handlers::quizzes::get_results))
        .route("/{id}/export", post(handlers::quizzes::export_results))
        .route("/{id}/cooldown", get(handlers::quizzes::cooldown_status))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ));

    browse_routes.merge(attempt_routes)
}

fn topic_routes(
    app_state: std::sync::Arc<services::AppState>,
) -> Router<std::sync::Arc<services::AppState>> {
    let public_routes = Router::new().route("/", get(handlers::topics::list_topics));

    let admin_only = Router::new()
        .route("/", post(handlers::topics::create_topic))
        .route(
            "/{id}",
            put(handlers::topics::update_topic).delete(handlers::topics::delete_topic),
        )
        .route_layer(middleware::from_fn(
            middlewares::auth::admin_guard_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ));

    public_routes.merge(admin_only)
}

fn user_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        .route(
            "/profile",
            get(handlers::users::get_profile).put(handlers::users::update_profile),
        )
        .route("/profile/stats", get(handlers::users::get_stats))
        .route("/profile/activity", get(handlers::users::get_activity))
        .route("/profile/history", get(handlers::users::get_history))
}

fn leaderboard_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        .route("/global", get(handlers::leaderboard::global))
        .route("/quiz/{quiz_id}", get(handlers::leaderboard::quiz))
        .route("/topic/{topic_id}", get(handlers::leaderboard::topic))
        .route("/weekly", get(handlers::leaderboard::weekly))
}

fn achievement_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        .route("/", get(handlers::achievements::list_unlocked))
        .route("/progress", get(handlers::achievements::progress))
}

fn admin_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        .route("/dashboard", get(handlers::admin::dashboard))
        .route("/quizzes", post(handlers::admin::create_quiz))
        .route(
            "/quizzes/{id}",
            put(handlers::admin::update_quiz).delete(handlers::admin::delete_quiz),
        )
        .route(
            "/quizzes/{id}/analytics",
            get(handlers::admin::quiz_analytics),
        )
        .route_layer(middleware::from_fn(
            middlewares::auth::admin_guard_middleware,
        ))
}
