//! Scans repository for database operations

use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::scan::Scan,
};

#[derive(Clone)]
pub struct ScansRepository {
    pool: Pool<Postgres>,
}

impl ScansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn list(&self, work_id: i32) -> AppResult<Vec<Scan>> {
        let scans = sqlx::query_as::<_, Scan>("SELECT * FROM scans WHERE work_id = $1 ORDER BY position, id")
            .bind(work_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(scans)
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<Scan> {
        sqlx::query_as::<_, Scan>("SELECT * FROM scans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Scan with id {} not found", id)))
    }

    pub async fn digest_exists(&self, work_id: i32, sha256: &str) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM scans WHERE work_id = $1 AND sha256 = $2)")
            .bind(work_id)
            .bind(sha256)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    /// Append a scan after the existing ones
    pub async fn create(
        &self,
        work_id: i32,
        original_name: Option<&str>,
        stored_path: &str,
        content_type: &str,
        size_bytes: i64,
        sha256: &str,
        label: Option<&str>,
    ) -> AppResult<Scan> {
        let scan = sqlx::query_as::<_, Scan>(
            r#"
            INSERT INTO scans (work_id, position, original_name, stored_path, content_type, size_bytes, sha256, label)
            SELECT $1, COALESCE(MAX(position) + 1, 0), $2, $3, $4, $5, $6, $7
            FROM scans WHERE work_id = $1
            ON CONFLICT (work_id, sha256) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(work_id)
        .bind(original_name)
        .bind(stored_path)
        .bind(content_type)
        .bind(size_bytes)
        .bind(sha256)
        .bind(label)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::Conflict("This file is already attached to the work".to_string()))?;

        Ok(scan)
    }

    pub async fn update_label(&self, id: i32, label: Option<&str>) -> AppResult<Scan> {
        sqlx::query_as::<_, Scan>("UPDATE scans SET label = $1 WHERE id = $2 RETURNING *")
            .bind(label)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Scan with id {} not found", id)))
    }

    /// Apply a new order. `scan_ids` must list every scan of the work exactly once.
    pub async fn reorder(&self, work_id: i32, scan_ids: &[i32]) -> AppResult<Vec<Scan>> {
        let mut tx = self.pool.begin().await?;

        let mut existing: Vec<i32> =
            sqlx::query_scalar("SELECT id FROM scans WHERE work_id = $1 ORDER BY id FOR UPDATE")
                .bind(work_id)
                .fetch_all(&mut *tx)
                .await?;
        let mut requested = scan_ids.to_vec();
        existing.sort_unstable();
        requested.sort_unstable();
        if existing != requested {
            return Err(AppError::BadRequest(
                "The new order must list every scan of the work exactly once".to_string(),
            ));
        }

        for (pos, id) in scan_ids.iter().enumerate() {
            sqlx::query("UPDATE scans SET position = $1 WHERE id = $2")
                .bind(pos as i32)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        self.list(work_id).await
    }

    pub async fn delete(&self, id: i32) -> AppResult<Scan> {
        sqlx::query_as::<_, Scan>("DELETE FROM scans WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Scan with id {} not found", id)))
    }
}
