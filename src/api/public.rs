//! Public read-only catalog: no authentication, deleted works are invisible

use axum::{
    extract::{Path, Query, State},
    response::Response,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        scan::Scan,
        work::{Work, WorkQuery},
    },
};

use super::{
    scans::file_response,
    works::{marc_response, MarcQuery},
    PaginatedResponse, WorkPage,
};

/// Browse and search the public catalog
#[utoipa::path(
    get,
    path = "/public/works",
    tag = "public",
    params(WorkQuery),
    responses(
        (status = 200, description = "Matching active works", body = WorkPage)
    )
)]
pub async fn list_works(
    State(state): State<crate::AppState>,
    Query(query): Query<WorkQuery>,
) -> AppResult<Json<WorkPage>> {
    let (page, per_page) = (query.page(), query.per_page());
    let (items, total) = state.services.catalog.search_public(query).await?;

    Ok(Json(PaginatedResponse {
        items,
        total,
        page,
        per_page,
    }))
}

/// Get an active work
#[utoipa::path(
    get,
    path = "/public/works/{id}",
    tag = "public",
    params(
        ("id" = i32, Path, description = "Work ID")
    ),
    responses(
        (status = 200, description = "Work", body = Work),
        (status = 404, description = "Work not found")
    )
)]
pub async fn get_work(State(state): State<crate::AppState>, Path(id): Path<i32>) -> AppResult<Json<Work>> {
    let work = state.services.catalog.get_public(id).await?;
    Ok(Json(work))
}

/// MARC21 rendering of an active work
#[utoipa::path(
    get,
    path = "/public/works/{id}/marc",
    tag = "public",
    params(
        ("id" = i32, Path, description = "Work ID"),
        MarcQuery
    ),
    responses(
        (status = 200, description = "MARC record"),
        (status = 404, description = "Work not found")
    )
)]
pub async fn get_work_marc(
    State(state): State<crate::AppState>,
    Path(id): Path<i32>,
    Query(query): Query<MarcQuery>,
) -> AppResult<Response> {
    let format = query.format.unwrap_or_default();
    let work = state.services.catalog.get_public(id).await?;
    let rendered = state.services.catalog.render_marc(&work, format)?;
    Ok(marc_response(rendered, &work.control_number, format))
}

/// Scans of an active work
#[utoipa::path(
    get,
    path = "/public/works/{id}/scans",
    tag = "public",
    params(
        ("id" = i32, Path, description = "Work ID")
    ),
    responses(
        (status = 200, description = "Scans in display order", body = Vec<Scan>),
        (status = 404, description = "Work not found")
    )
)]
pub async fn list_scans(State(state): State<crate::AppState>, Path(id): Path<i32>) -> AppResult<Json<Vec<Scan>>> {
    let scans = state.services.scans.list_public(id).await?;
    Ok(Json(scans))
}

/// Download a scan of an active work
#[utoipa::path(
    get,
    path = "/public/scans/{id}/file",
    tag = "public",
    params(
        ("id" = i32, Path, description = "Scan ID")
    ),
    responses(
        (status = 200, description = "Scan file"),
        (status = 404, description = "Scan not found")
    )
)]
pub async fn download_scan(State(state): State<crate::AppState>, Path(id): Path<i32>) -> AppResult<Response> {
    let (scan, data) = state.services.scans.download_public(id).await?;
    Ok(file_response(&scan, data))
}
