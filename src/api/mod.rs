//! API handlers for Musicat REST endpoints

pub mod admin;
pub mod auth;
pub mod authorities;
pub mod health;
pub mod openapi;
pub mod public;
pub mod scans;
pub mod users;
pub mod works;

use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
    routing::{get, post, put},
    Router,
};
use serde::Serialize;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::ToSchema;

use crate::{
    error::AppError,
    models::{user::UserClaims, work::WorkSummary},
    AppState,
};

/// Extractor for authenticated user from JWT token
pub struct AuthenticatedUser(pub UserClaims);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Authentication("Invalid authorization header format".to_string()))?;

        let claims = UserClaims::from_token(token, &state.config.auth.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;

        Ok(AuthenticatedUser(claims))
    }
}

/// Paginated response wrapper
#[derive(Serialize, ToSchema)]
#[aliases(WorkPage = PaginatedResponse<WorkSummary>)]
pub struct PaginatedResponse<T>
where
    T: for<'a> ToSchema<'a>,
{
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Multipart overhead on top of the file itself
    let upload_limit = state.services.scans.max_upload_bytes() + 64 * 1024;

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Authentication
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        .route("/auth/password", put(auth::change_password))
        // Users
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/users/:id", get(users::get_user).delete(users::delete_user))
        // Works
        .route("/works", get(works::list_works).post(works::create_work))
        .route("/works/by-control-number/:control_number", get(works::get_work_by_control_number))
        .route(
            "/works/:id",
            get(works::get_work).put(works::update_work).delete(works::delete_work),
        )
        .route("/works/:id/restore", post(works::restore_work))
        .route("/works/:id/marc", get(works::get_work_marc))
        // Scans
        .route(
            "/works/:id/scans",
            get(scans::list_scans)
                .post(scans::upload_scan)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/works/:id/scans/order", put(scans::reorder_scans))
        .route("/scans/:id", put(scans::update_scan).delete(scans::delete_scan))
        .route("/scans/:id/file", get(scans::download_scan))
        // Authorities
        .route(
            "/authorities/:kind",
            get(authorities::search_authorities).post(authorities::create_authority),
        )
        .route(
            "/authorities/:kind/:id",
            get(authorities::get_authority).put(authorities::rename_authority),
        )
        .route("/authorities/:kind/:id/works", get(authorities::authority_usage))
        // Administration
        .route("/admin/purge", post(admin::purge))
        // Public catalog
        .route("/public/works", get(public::list_works))
        .route("/public/works/:id", get(public::get_work))
        .route("/public/works/:id/marc", get(public::get_work_marc))
        .route("/public/works/:id/scans", get(public::list_scans))
        .route("/public/scans/:id/file", get(public::download_scan))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
