//! Work (bibliographic record) endpoints

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    error::AppResult,
    marc::MarcOutput,
    models::work::{Work, WorkDraft, WorkQuery},
    services::catalog::RenderedRecord,
};

use super::{AuthenticatedUser, PaginatedResponse, WorkPage};

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct MarcQuery {
    /// `text` (default), `json` or `iso2709`
    pub format: Option<MarcOutput>,
}

/// Build the HTTP response for a rendered record
pub(crate) fn marc_response(rendered: RenderedRecord, control_number: &str, format: MarcOutput) -> Response {
    let mut response = (
        [(header::CONTENT_TYPE, rendered.content_type)],
        rendered.body,
    )
        .into_response();
    if format == MarcOutput::Iso2709 {
        if let Ok(value) = format!("attachment; filename=\"{}.mrc\"", control_number).parse() {
            response.headers_mut().insert(header::CONTENT_DISPOSITION, value);
        }
    }
    response
}

/// Search works
#[utoipa::path(
    get,
    path = "/works",
    tag = "works",
    security(("bearer_auth" = [])),
    params(WorkQuery),
    responses(
        (status = 200, description = "Matching works", body = WorkPage),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_works(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Query(query): Query<WorkQuery>,
) -> AppResult<Json<WorkPage>> {
    let (items, total) = state.services.catalog.search(&query).await?;

    Ok(Json(PaginatedResponse {
        items,
        total,
        page: query.page(),
        per_page: query.per_page(),
    }))
}

/// Get a work by ID (deleted works included)
#[utoipa::path(
    get,
    path = "/works/{id}",
    tag = "works",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Work ID")
    ),
    responses(
        (status = 200, description = "Work", body = Work),
        (status = 404, description = "Work not found")
    )
)]
pub async fn get_work(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Work>> {
    let work = state.services.catalog.get(id).await?;
    Ok(Json(work))
}

/// Get a work by its control number (001)
#[utoipa::path(
    get,
    path = "/works/by-control-number/{control_number}",
    tag = "works",
    security(("bearer_auth" = [])),
    params(
        ("control_number" = String, Path, description = "Control number, e.g. PR000012")
    ),
    responses(
        (status = 200, description = "Work", body = Work),
        (status = 404, description = "Work not found")
    )
)]
pub async fn get_work_by_control_number(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(control_number): Path<String>,
) -> AppResult<Json<Work>> {
    let work = state.services.catalog.get_by_control_number(&control_number).await?;
    Ok(Json(work))
}

/// Create a work
#[utoipa::path(
    post,
    path = "/works",
    tag = "works",
    security(("bearer_auth" = [])),
    request_body = WorkDraft,
    responses(
        (status = 201, description = "Work created", body = Work),
        (status = 400, description = "Malformed submission"),
        (status = 422, description = "Record violates MARC21 rules", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_work(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(draft): Json<WorkDraft>,
) -> AppResult<(StatusCode, Json<Work>)> {
    claims.require_catalog_write()?;

    let work = state.services.catalog.create(draft, Some(claims.user_id)).await?;
    Ok((StatusCode::CREATED, Json(work)))
}

/// Replace a work
#[utoipa::path(
    put,
    path = "/works/{id}",
    tag = "works",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Work ID")
    ),
    request_body = WorkDraft,
    responses(
        (status = 200, description = "Work updated", body = Work),
        (status = 404, description = "Work not found"),
        (status = 422, description = "Record violates MARC21 rules", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_work(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(draft): Json<WorkDraft>,
) -> AppResult<Json<Work>> {
    claims.require_catalog_write()?;

    let work = state.services.catalog.update(id, draft).await?;
    Ok(Json(work))
}

/// Soft delete a work
#[utoipa::path(
    delete,
    path = "/works/{id}",
    tag = "works",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Work ID")
    ),
    responses(
        (status = 204, description = "Work deleted"),
        (status = 404, description = "Work not found"),
        (status = 422, description = "Work already deleted")
    )
)]
pub async fn delete_work(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    claims.require_catalog_write()?;

    state.services.catalog.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Restore a soft-deleted work
#[utoipa::path(
    post,
    path = "/works/{id}/restore",
    tag = "works",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Work ID")
    ),
    responses(
        (status = 200, description = "Work restored", body = Work),
        (status = 404, description = "Work not found"),
        (status = 422, description = "Work is not deleted")
    )
)]
pub async fn restore_work(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Work>> {
    claims.require_catalog_write()?;

    let work = state.services.catalog.restore(id).await?;
    Ok(Json(work))
}

/// MARC21 rendering of a work
#[utoipa::path(
    get,
    path = "/works/{id}/marc",
    tag = "works",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Work ID"),
        MarcQuery
    ),
    responses(
        (status = 200, description = "MARC record (text, MARC-in-JSON or ISO 2709)"),
        (status = 404, description = "Work not found")
    )
)]
pub async fn get_work_marc(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Query(query): Query<MarcQuery>,
) -> AppResult<Response> {
    let format = query.format.unwrap_or_default();
    let work = state.services.catalog.get(id).await?;
    let rendered = state.services.catalog.render_marc(&work, format)?;
    Ok(marc_response(rendered, &work.control_number, format))
}
