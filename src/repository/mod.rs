//! Repository layer for database operations

pub mod authorities;
pub mod scans;
pub mod users;
pub mod works;

use sqlx::{Pool, Postgres};

use crate::error::AppResult;

/// Main repository struct holding database connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub works: works::WorksRepository,
    pub authorities: authorities::AuthoritiesRepository,
    pub scans: scans::ScansRepository,
    pub users: users::UsersRepository,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            works: works::WorksRepository::new(pool.clone()),
            authorities: authorities::AuthoritiesRepository::new(pool.clone()),
            scans: scans::ScansRepository::new(pool.clone()),
            users: users::UsersRepository::new(pool.clone()),
            pool,
        }
    }

    /// Round-trip to the database
    pub async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
