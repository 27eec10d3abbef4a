//! Digitized pages and documents attached to works

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Content types accepted for scans, with the extension used on disk
pub const ALLOWED_CONTENT_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/tiff", "tif"),
    ("application/pdf", "pdf"),
];

pub fn extension_for(content_type: &str) -> Option<&'static str> {
    ALLOWED_CONTENT_TYPES
        .iter()
        .find(|(ct, _)| *ct == content_type)
        .map(|(_, ext)| *ext)
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Scan {
    pub id: i32,
    pub work_id: i32,
    pub position: i32,
    pub original_name: Option<String>,
    #[serde(skip_serializing)]
    pub stored_path: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub sha256: String,
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Scan file as received from an upload, before it is written to storage
#[derive(Debug)]
pub struct NewScan {
    pub file_id: Uuid,
    pub original_name: Option<String>,
    pub content_type: String,
    pub data: Vec<u8>,
    pub label: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateScan {
    #[validate(length(max = 200, message = "Label must be at most 200 characters"))]
    pub label: Option<String>,
}

/// New order of the scans of a work (every scan id exactly once)
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReorderScans {
    pub scan_ids: Vec<i32>,
}
