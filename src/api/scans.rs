//! Scan (digitization) endpoints

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::Multipart;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::scan::{NewScan, ReorderScans, Scan, UpdateScan},
};

use super::AuthenticatedUser;

/// Build the HTTP response carrying a scan file
pub(crate) fn file_response(scan: &Scan, data: Vec<u8>) -> Response {
    let mut response = ([(header::CONTENT_TYPE, scan.content_type.clone())], data).into_response();
    if let Some(name) = scan.original_name.as_deref() {
        let name = name.replace('"', "");
        if let Ok(value) = format!("inline; filename=\"{}\"", name).parse() {
            response.headers_mut().insert(header::CONTENT_DISPOSITION, value);
        }
    }
    response
}

/// Scans of a work, in display order
#[utoipa::path(
    get,
    path = "/works/{id}/scans",
    tag = "scans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Work ID")
    ),
    responses(
        (status = 200, description = "Scans", body = Vec<Scan>),
        (status = 404, description = "Work not found")
    )
)]
pub async fn list_scans(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Vec<Scan>>> {
    let scans = state.services.scans.list(id).await?;
    Ok(Json(scans))
}

/// Upload a scan (multipart: `file`, optional `label`)
#[utoipa::path(
    post,
    path = "/works/{id}/scans",
    tag = "scans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Work ID")
    ),
    request_body(content = Vec<u8>, content_type = "multipart/form-data", description = "`file` part and optional `label` part"),
    responses(
        (status = 201, description = "Scan stored", body = Scan),
        (status = 400, description = "Missing file, empty file, unsupported type or too large"),
        (status = 409, description = "Same file already attached"),
        (status = 422, description = "Work is deleted")
    )
)]
pub async fn upload_scan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<Scan>)> {
    claims.require_catalog_write()?;

    let mut file: Option<(Option<String>, String, Vec<u8>)> = None;
    let mut label: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let original_name = field.file_name().map(str::to_string);
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {}", e)))?;
                file = Some((original_name, content_type, data.to_vec()));
            }
            "label" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read label: {}", e)))?;
                label = Some(text);
            }
            _ => {}
        }
    }

    let (original_name, content_type, data) =
        file.ok_or_else(|| AppError::BadRequest("Missing `file` part".to_string()))?;

    let label = label.map(|l| l.trim().to_string()).filter(|l| !l.is_empty());
    UpdateScan { label: label.clone() }.validate()?;

    let scan = state
        .services
        .scans
        .upload(
            id,
            NewScan {
                file_id: Uuid::new_v4(),
                original_name,
                content_type,
                data,
                label,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(scan)))
}

/// Set the display order of all scans of a work
#[utoipa::path(
    put,
    path = "/works/{id}/scans/order",
    tag = "scans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Work ID")
    ),
    request_body = ReorderScans,
    responses(
        (status = 200, description = "Scans in their new order", body = Vec<Scan>),
        (status = 400, description = "Ids do not match the work's scans")
    )
)]
pub async fn reorder_scans(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<ReorderScans>,
) -> AppResult<Json<Vec<Scan>>> {
    claims.require_catalog_write()?;

    let scans = state.services.scans.reorder(id, &request.scan_ids).await?;
    Ok(Json(scans))
}

/// Change the label of a scan
#[utoipa::path(
    put,
    path = "/scans/{id}",
    tag = "scans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Scan ID")
    ),
    request_body = UpdateScan,
    responses(
        (status = 200, description = "Scan updated", body = Scan),
        (status = 404, description = "Scan not found")
    )
)]
pub async fn update_scan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<UpdateScan>,
) -> AppResult<Json<Scan>> {
    claims.require_catalog_write()?;
    request.validate()?;

    let scan = state.services.scans.relabel(id, request.label.as_deref()).await?;
    Ok(Json(scan))
}

/// Delete a scan and its file
#[utoipa::path(
    delete,
    path = "/scans/{id}",
    tag = "scans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Scan ID")
    ),
    responses(
        (status = 204, description = "Scan deleted"),
        (status = 404, description = "Scan not found")
    )
)]
pub async fn delete_scan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    claims.require_catalog_write()?;

    state.services.scans.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Download a scan file
#[utoipa::path(
    get,
    path = "/scans/{id}/file",
    tag = "scans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Scan ID")
    ),
    responses(
        (status = 200, description = "Scan file"),
        (status = 404, description = "Scan or file not found")
    )
)]
pub async fn download_scan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Response> {
    let (scan, data) = state.services.scans.download(id).await?;
    Ok(file_response(&scan, data))
}
