//! Authority vocabularies service

use validator::Validate;

use crate::{
    error::AppResult,
    models::{
        authority::{Authority, AuthorityInput, AuthorityQuery, AuthorityUsage},
        enums::AuthorityKind,
    },
    repository::Repository,
};

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

#[derive(Clone)]
pub struct AuthoritiesService {
    repository: Repository,
}

impl AuthoritiesService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn search(&self, kind: AuthorityKind, query: &AuthorityQuery) -> AppResult<Vec<Authority>> {
        let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        self.repository
            .authorities
            .search(kind, query.q.as_deref(), limit)
            .await
    }

    pub async fn get(&self, kind: AuthorityKind, id: i32) -> AppResult<Authority> {
        self.repository.authorities.get_by_id(kind, id).await
    }

    pub async fn create(&self, kind: AuthorityKind, input: AuthorityInput) -> AppResult<Authority> {
        input.validate()?;
        let created = self.repository.authorities.create(kind, &input).await?;
        tracing::info!(%kind, id = created.id, key = %created.key, "Authority created");
        Ok(created)
    }

    pub async fn rename(&self, kind: AuthorityKind, id: i32, input: AuthorityInput) -> AppResult<Authority> {
        input.validate()?;
        let renamed = self.repository.authorities.rename(kind, id, &input).await?;
        tracing::info!(%kind, id, key = %renamed.key, "Authority renamed");
        Ok(renamed)
    }

    pub async fn usage(&self, kind: AuthorityKind, id: i32) -> AppResult<AuthorityUsage> {
        let authority = self.repository.authorities.get_by_id(kind, id).await?;
        let work_ids = self.repository.authorities.works_using(kind, id).await?;
        Ok(AuthorityUsage {
            kind,
            authority,
            work_ids,
        })
    }
}
