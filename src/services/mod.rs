//! Business logic services

pub mod authorities;
pub mod catalog;
pub mod scans;
pub mod users;
pub mod validation;

use crate::{config::AppConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub catalog: catalog::CatalogService,
    pub authorities: authorities::AuthoritiesService,
    pub scans: scans::ScansService,
    pub users: users::UsersService,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, config: &AppConfig) -> Self {
        let storage = scans::ScanStorage::new(&config.storage.scans_dir);
        Self {
            catalog: catalog::CatalogService::new(
                repository.clone(),
                config.cataloging.clone(),
                config.retention.clone(),
                storage.clone(),
            ),
            authorities: authorities::AuthoritiesService::new(repository.clone()),
            scans: scans::ScansService::new(repository.clone(), &config.storage, storage),
            users: users::UsersService::new(repository, config.auth.clone()),
        }
    }
}
