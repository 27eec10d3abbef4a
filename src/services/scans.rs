//! Digitization: scan files attached to works

use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::{
    config::StorageConfig,
    error::{AppError, AppResult},
    models::scan::{extension_for, NewScan, Scan},
    repository::Repository,
};

/// Scan files on disk, addressed by paths relative to the storage root
#[derive(Clone)]
pub struct ScanStorage {
    root: PathBuf,
}

impl ScanStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, relative: &str) -> AppResult<PathBuf> {
        let path = Path::new(relative);
        if !path.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(AppError::Internal(format!("Refusing scan path {}", relative)));
        }
        Ok(self.root.join(path))
    }

    pub async fn write(&self, relative: &str, data: &[u8]) -> AppResult<()> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;
        Ok(())
    }

    pub async fn read(&self, relative: &str) -> AppResult<Vec<u8>> {
        let path = self.resolve(relative)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound(format!("Scan file {} is missing", relative)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a file; a file that is already gone is not an error
    pub async fn remove(&self, relative: &str) -> AppResult<()> {
        let path = self.resolve(relative)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[derive(Clone)]
pub struct ScansService {
    repository: Repository,
    storage: ScanStorage,
    max_upload_bytes: usize,
}

impl ScansService {
    pub fn new(repository: Repository, config: &StorageConfig, storage: ScanStorage) -> Self {
        Self {
            repository,
            storage,
            max_upload_bytes: config.max_upload_mb * 1024 * 1024,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Attach a file to an active work
    pub async fn upload(&self, work_id: i32, scan: NewScan) -> AppResult<Scan> {
        if !self.repository.works.is_active(work_id).await? {
            return Err(AppError::BusinessRule("Scans cannot be added to a deleted work".to_string()));
        }
        let extension = extension_for(&scan.content_type).ok_or_else(|| {
            AppError::BadRequest(format!("Unsupported content type {}", scan.content_type))
        })?;
        if scan.data.is_empty() {
            return Err(AppError::BadRequest("Uploaded file is empty".to_string()));
        }
        if scan.data.len() > self.max_upload_bytes {
            return Err(AppError::BadRequest(format!(
                "File exceeds the {} byte upload limit",
                self.max_upload_bytes
            )));
        }

        let digest = sha256_hex(&scan.data);
        if self.repository.scans.digest_exists(work_id, &digest).await? {
            return Err(AppError::Conflict("This file is already attached to the work".to_string()));
        }

        let stored_path = format!("{}/{}.{}", work_id, scan.file_id, extension);
        self.storage.write(&stored_path, &scan.data).await?;

        let created = self
            .repository
            .scans
            .create(
                work_id,
                scan.original_name.as_deref(),
                &stored_path,
                &scan.content_type,
                scan.data.len() as i64,
                &digest,
                scan.label.as_deref(),
            )
            .await;

        match created {
            Ok(created) => {
                tracing::info!(work_id, scan_id = created.id, size = created.size_bytes, "Scan uploaded");
                Ok(created)
            }
            Err(e) => {
                // Lost a race on the digest or the insert failed: drop the orphan file.
                if let Err(remove_err) = self.storage.remove(&stored_path).await {
                    tracing::warn!(path = %stored_path, error = %remove_err, "Failed to remove orphan scan file");
                }
                Err(e)
            }
        }
    }

    pub async fn list(&self, work_id: i32) -> AppResult<Vec<Scan>> {
        self.repository.works.is_active(work_id).await?;
        self.repository.scans.list(work_id).await
    }

    /// Scans of an active work
    pub async fn list_public(&self, work_id: i32) -> AppResult<Vec<Scan>> {
        if !self.repository.works.is_active(work_id).await? {
            return Err(AppError::NotFound(format!("Work with id {} not found", work_id)));
        }
        self.repository.scans.list(work_id).await
    }

    pub async fn relabel(&self, id: i32, label: Option<&str>) -> AppResult<Scan> {
        let label = label.map(str::trim).filter(|l| !l.is_empty());
        self.repository.scans.update_label(id, label).await
    }

    pub async fn reorder(&self, work_id: i32, scan_ids: &[i32]) -> AppResult<Vec<Scan>> {
        self.repository.works.is_active(work_id).await?;
        self.repository.scans.reorder(work_id, scan_ids).await
    }

    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let scan = self.repository.scans.delete(id).await?;
        if let Err(e) = self.storage.remove(&scan.stored_path).await {
            tracing::warn!(scan_id = id, path = %scan.stored_path, error = %e, "Failed to remove scan file");
        }
        tracing::info!(scan_id = id, work_id = scan.work_id, "Scan deleted");
        Ok(())
    }

    /// Scan metadata and content
    pub async fn download(&self, id: i32) -> AppResult<(Scan, Vec<u8>)> {
        let scan = self.repository.scans.get_by_id(id).await?;
        let data = self.storage.read(&scan.stored_path).await?;
        Ok((scan, data))
    }

    /// Download restricted to scans of active works
    pub async fn download_public(&self, id: i32) -> AppResult<(Scan, Vec<u8>)> {
        let scan = self.repository.scans.get_by_id(id).await?;
        if !self.repository.works.is_active(scan.work_id).await? {
            return Err(AppError::NotFound(format!("Scan with id {} not found", id)));
        }
        let data = self.storage.read(&scan.stored_path).await?;
        Ok((scan, data))
    }
}
