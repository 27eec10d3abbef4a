//! Authority vocabulary endpoints (`/authorities/{kind}`)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::{AppError, AppResult},
    models::{
        authority::{Authority, AuthorityInput, AuthorityQuery, AuthorityUsage},
        enums::AuthorityKind,
    },
};

use super::AuthenticatedUser;

fn parse_kind(slug: &str) -> AppResult<AuthorityKind> {
    AuthorityKind::from_slug(slug)
        .ok_or_else(|| AppError::NotFound(format!("Unknown authority vocabulary '{}'", slug)))
}

/// Search headings of a vocabulary
#[utoipa::path(
    get,
    path = "/authorities/{kind}",
    tag = "authorities",
    security(("bearer_auth" = [])),
    params(
        ("kind" = String, Path, description = "persons, corporate-bodies, uniform-titles, musical-forms or subjects"),
        AuthorityQuery
    ),
    responses(
        (status = 200, description = "Matching headings", body = Vec<Authority>),
        (status = 404, description = "Unknown vocabulary")
    )
)]
pub async fn search_authorities(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(kind): Path<String>,
    Query(query): Query<AuthorityQuery>,
) -> AppResult<Json<Vec<Authority>>> {
    let kind = parse_kind(&kind)?;
    let authorities = state.services.authorities.search(kind, &query).await?;
    Ok(Json(authorities))
}

/// Get a heading
#[utoipa::path(
    get,
    path = "/authorities/{kind}/{id}",
    tag = "authorities",
    security(("bearer_auth" = [])),
    params(
        ("kind" = String, Path, description = "Vocabulary"),
        ("id" = i32, Path, description = "Authority ID")
    ),
    responses(
        (status = 200, description = "Heading", body = Authority),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_authority(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path((kind, id)): Path<(String, i32)>,
) -> AppResult<Json<Authority>> {
    let kind = parse_kind(&kind)?;
    let authority = state.services.authorities.get(kind, id).await?;
    Ok(Json(authority))
}

/// Add a heading
#[utoipa::path(
    post,
    path = "/authorities/{kind}",
    tag = "authorities",
    security(("bearer_auth" = [])),
    params(
        ("kind" = String, Path, description = "Vocabulary")
    ),
    request_body = AuthorityInput,
    responses(
        (status = 201, description = "Heading created", body = Authority),
        (status = 409, description = "Heading already exists")
    )
)]
pub async fn create_authority(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(kind): Path<String>,
    Json(input): Json<AuthorityInput>,
) -> AppResult<(StatusCode, Json<Authority>)> {
    claims.require_catalog_write()?;
    let kind = parse_kind(&kind)?;

    let authority = state.services.authorities.create(kind, input).await?;
    Ok((StatusCode::CREATED, Json(authority)))
}

/// Correct a heading; every work using it follows
#[utoipa::path(
    put,
    path = "/authorities/{kind}/{id}",
    tag = "authorities",
    security(("bearer_auth" = [])),
    params(
        ("kind" = String, Path, description = "Vocabulary"),
        ("id" = i32, Path, description = "Authority ID")
    ),
    request_body = AuthorityInput,
    responses(
        (status = 200, description = "Heading renamed", body = Authority),
        (status = 404, description = "Not found"),
        (status = 409, description = "Another heading already has this form")
    )
)]
pub async fn rename_authority(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path((kind, id)): Path<(String, i32)>,
    Json(input): Json<AuthorityInput>,
) -> AppResult<Json<Authority>> {
    claims.require_catalog_write()?;
    let kind = parse_kind(&kind)?;

    let authority = state.services.authorities.rename(kind, id, input).await?;
    Ok(Json(authority))
}

/// Works referencing a heading
#[utoipa::path(
    get,
    path = "/authorities/{kind}/{id}/works",
    tag = "authorities",
    security(("bearer_auth" = [])),
    params(
        ("kind" = String, Path, description = "Vocabulary"),
        ("id" = i32, Path, description = "Authority ID")
    ),
    responses(
        (status = 200, description = "Usage", body = AuthorityUsage),
        (status = 404, description = "Not found")
    )
)]
pub async fn authority_usage(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path((kind, id)): Path<(String, i32)>,
) -> AppResult<Json<AuthorityUsage>> {
    let kind = parse_kind(&kind)?;
    let usage = state.services.authorities.usage(kind, id).await?;
    Ok(Json(usage))
}
