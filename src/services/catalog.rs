//! Catalog management service: works, their lifecycle and MARC output

use chrono::{Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use validator::Validate;

use super::{scans::ScanStorage, validation};
use crate::{
    config::{CatalogingConfig, RetentionConfig},
    error::{AppError, AppResult},
    marc::{writer, MarcOutput, MarcTranslator},
    models::work::{Work, WorkDraft, WorkQuery, WorkSummary},
    repository::Repository,
};

/// Result of a purge run
#[derive(Debug, Serialize, ToSchema)]
pub struct PurgeReport {
    pub purged: u64,
    pub files_removed: usize,
}

/// Serialized MARC record ready to be sent
pub struct RenderedRecord {
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
    cataloging: CatalogingConfig,
    retention: RetentionConfig,
    storage: ScanStorage,
}

impl CatalogService {
    pub fn new(
        repository: Repository,
        cataloging: CatalogingConfig,
        retention: RetentionConfig,
        storage: ScanStorage,
    ) -> Self {
        Self {
            repository,
            cataloging,
            retention,
            storage,
        }
    }

    pub async fn ping(&self) -> AppResult<()> {
        self.repository.ping().await
    }

    /// Search works (cataloger view)
    pub async fn search(&self, query: &WorkQuery) -> AppResult<(Vec<WorkSummary>, i64)> {
        self.repository.works.search(query).await
    }

    /// Search active works only
    pub async fn search_public(&self, mut query: WorkQuery) -> AppResult<(Vec<WorkSummary>, i64)> {
        query.include_deleted = Some(false);
        self.repository.works.search(&query).await
    }

    pub async fn get(&self, id: i32) -> AppResult<Work> {
        self.repository.works.get_by_id(id).await
    }

    /// Get an active work; deleted works do not exist for the public
    pub async fn get_public(&self, id: i32) -> AppResult<Work> {
        let work = self.repository.works.get_by_id(id).await?;
        if !work.is_active() {
            return Err(AppError::NotFound(format!("Work with id {} not found", id)));
        }
        Ok(work)
    }

    pub async fn get_by_control_number(&self, control_number: &str) -> AppResult<Work> {
        self.repository.works.get_by_control_number(control_number).await
    }

    /// Create a work from a complete submission
    pub async fn create(&self, draft: WorkDraft, user_id: Option<i32>) -> AppResult<Work> {
        draft.validate()?;

        let mut tx = self.repository.pool.begin().await?;
        let targets = self
            .repository
            .works
            .link_targets(&mut *tx, &draft.linked_ids())
            .await?;
        validation::validate(&draft, &validation::ValidationContext::for_new(&targets))
            .map_err(AppError::InvalidRecord)?;

        let id = self
            .repository
            .works
            .insert(&mut *tx, &draft, &targets, &self.cataloging, user_id)
            .await?;
        tx.commit().await?;

        self.get(id).await
    }

    /// Replace a work with a new submission
    pub async fn update(&self, id: i32, draft: WorkDraft) -> AppResult<Work> {
        draft.validate()?;

        let mut tx = self.repository.pool.begin().await?;
        let current = self.repository.works.lock(&mut *tx, id).await?;
        if current.deleted_at.is_some() {
            return Err(AppError::BusinessRule(format!(
                "Work {} is deleted; restore it before editing",
                current.control_number
            )));
        }
        if current.record_type != draft.record_type {
            return Err(AppError::BusinessRule(
                "The record type of an existing work cannot change".to_string(),
            ));
        }

        let previous_links = self.repository.works.load_links(&mut *tx, id).await?;
        let mut ids = draft.linked_ids();
        ids.extend(previous_links.iter().filter_map(|l| l.target_id));
        ids.sort_unstable();
        ids.dedup();
        let targets = self.repository.works.link_targets(&mut *tx, &ids).await?;

        let ctx = validation::ValidationContext {
            work_id: Some(id),
            previous_links: &previous_links,
            targets: &targets,
        };
        validation::validate(&draft, &ctx).map_err(AppError::InvalidRecord)?;

        self.repository
            .works
            .replace(&mut *tx, &current, &draft, &previous_links, &targets, &self.cataloging)
            .await?;
        tx.commit().await?;

        self.get(id).await
    }

    /// Soft delete a work
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let mut tx = self.repository.pool.begin().await?;
        let current = self.repository.works.lock(&mut *tx, id).await?;
        if current.deleted_at.is_some() {
            return Err(AppError::BusinessRule(format!(
                "Work {} is already deleted",
                current.control_number
            )));
        }
        let unlinked = self.repository.works.soft_delete(&mut *tx, &current).await?;
        tx.commit().await?;

        tracing::info!(work_id = id, control_number = %current.control_number, unlinked, "Work deleted");
        Ok(())
    }

    /// Restore a soft-deleted work
    pub async fn restore(&self, id: i32) -> AppResult<Work> {
        let mut tx = self.repository.pool.begin().await?;
        let current = self.repository.works.lock(&mut *tx, id).await?;
        if current.deleted_at.is_none() {
            return Err(AppError::BusinessRule(format!(
                "Work {} is not deleted",
                current.control_number
            )));
        }
        let relinked = self.repository.works.restore(&mut *tx, &current).await?;
        tx.commit().await?;

        tracing::info!(work_id = id, control_number = %current.control_number, relinked, "Work restored");
        self.get(id).await
    }

    /// Purge works deleted longer ago than the retention window
    pub async fn purge_expired(&self) -> AppResult<PurgeReport> {
        self.purge_older_than(self.retention.purge_after_days).await
    }

    pub async fn purge_older_than(&self, days: i64) -> AppResult<PurgeReport> {
        if days < 0 {
            return Err(AppError::BadRequest("Retention must not be negative".to_string()));
        }
        let cutoff = Utc::now() - Duration::days(days);
        let (purged, paths) = self.repository.works.purge(cutoff).await?;
        if purged == 0 {
            return Ok(PurgeReport {
                purged: 0,
                files_removed: 0,
            });
        }

        let mut files_removed = 0;
        for path in &paths {
            match self.storage.remove(path).await {
                Ok(()) => files_removed += 1,
                Err(e) => tracing::warn!(path = %path, error = %e, "Failed to remove scan file"),
            }
        }

        tracing::info!(purged, files_removed, %cutoff, "Purged deleted works");
        Ok(PurgeReport { purged, files_removed })
    }

    /// Render a work as MARC21
    pub fn render_marc(&self, work: &Work, format: MarcOutput) -> AppResult<RenderedRecord> {
        let record = MarcTranslator::new(&self.cataloging).translate(work);
        let rendered = match format {
            MarcOutput::Text => RenderedRecord {
                content_type: "text/plain; charset=utf-8",
                body: writer::to_text(&record).into_bytes(),
            },
            MarcOutput::Json => RenderedRecord {
                content_type: "application/json",
                body: serde_json::to_vec(&writer::to_json(&record))
                    .map_err(|e| AppError::Internal(format!("Failed to serialize record: {}", e)))?,
            },
            MarcOutput::Iso2709 => RenderedRecord {
                content_type: "application/marc",
                body: writer::to_iso2709(&record)
                    .map_err(|e| AppError::BusinessRule(format!("Record cannot be exported: {}", e)))?,
            },
        };
        Ok(rendered)
    }
}
