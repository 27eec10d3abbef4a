//! Administrative operations

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{error::AppResult, services::catalog::PurgeReport};

use super::AuthenticatedUser;

#[derive(Debug, Deserialize, IntoParams)]
pub struct PurgeQuery {
    /// Override the configured retention (days since deletion)
    pub older_than_days: Option<i64>,
}

/// Permanently remove soft-deleted works past retention
#[utoipa::path(
    post,
    path = "/admin/purge",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(PurgeQuery),
    responses(
        (status = 200, description = "Purge report", body = PurgeReport),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn purge(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<PurgeQuery>,
) -> AppResult<Json<PurgeReport>> {
    claims.require_admin()?;

    let report = match query.older_than_days {
        Some(days) => state.services.catalog.purge_older_than(days).await?,
        None => state.services.catalog.purge_expired().await?,
    };
    Ok(Json(report))
}
