//! Authentication and user management service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::{
        enums::UserRole,
        user::{CreateUser, LoginResponse, User, UserClaims},
    },
    repository::Repository,
};

const BOOTSTRAP_LOGIN: &str = "admin";

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    config: AuthConfig,
}

impl UsersService {
    pub fn new(repository: Repository, config: AuthConfig) -> Self {
        Self { repository, config }
    }

    /// Authenticate user by login and return JWT token
    pub async fn authenticate(&self, login: &str, password: &str) -> AppResult<LoginResponse> {
        let user = self
            .repository
            .users
            .get_by_login(login)
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid login or password".to_string()))?;

        if !verify_password(&user.password_hash, password)? {
            return Err(AppError::Authentication("Invalid login or password".to_string()));
        }

        let expires_in = self.config.jwt_expiration_hours as i64 * 3600;
        let now = Utc::now().timestamp();
        let claims = UserClaims {
            sub: user.login.clone(),
            user_id: user.id,
            role: user.role,
            exp: now + expires_in,
            iat: now,
        };

        let token = claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))?;

        tracing::info!(user_id = user.id, login = %user.login, "User logged in");
        Ok(LoginResponse {
            token,
            token_type: "Bearer".to_string(),
            expires_in,
            user,
        })
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<User> {
        self.repository.users.get_by_id(id).await
    }

    pub async fn list(&self) -> AppResult<Vec<User>> {
        self.repository.users.list().await
    }

    /// Create a new user
    pub async fn create_user(&self, user: CreateUser) -> AppResult<User> {
        if self.repository.users.login_exists(&user.login).await? {
            return Err(AppError::Conflict("Login already exists".to_string()));
        }

        let hash = hash_password(&user.password)?;
        let created = self
            .repository
            .users
            .create(
                user.login.trim(),
                &hash,
                user.display_name.as_deref(),
                user.role.unwrap_or(UserRole::Cataloger),
            )
            .await?;

        tracing::info!(user_id = created.id, login = %created.login, role = %created.role, "User created");
        Ok(created)
    }

    pub async fn change_password(&self, user_id: i32, current: &str, new: &str) -> AppResult<()> {
        let user = self.repository.users.get_by_id(user_id).await?;
        if !verify_password(&user.password_hash, current)? {
            return Err(AppError::Authentication("Current password is incorrect".to_string()));
        }
        self.repository.users.update_password(user_id, &hash_password(new)?).await
    }

    /// Delete a user; an admin cannot delete their own account
    pub async fn delete_user(&self, id: i32, acting_user: i32) -> AppResult<()> {
        if id == acting_user {
            return Err(AppError::BusinessRule("You cannot delete your own account".to_string()));
        }
        self.repository.users.delete(id).await
    }

    /// Create the initial administrator when no account exists yet
    pub async fn bootstrap_admin(&self) -> AppResult<Option<User>> {
        let Some(password) = self.config.bootstrap_admin_password.as_deref() else {
            return Ok(None);
        };
        if self.repository.users.count().await? > 0 {
            return Ok(None);
        }

        let user = self
            .repository
            .users
            .create(BOOTSTRAP_LOGIN, &hash_password(password)?, Some("Administrator"), UserRole::Admin)
            .await?;
        tracing::warn!(login = BOOTSTRAP_LOGIN, "Created bootstrap administrator; change its password");
        Ok(Some(user))
    }
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

fn verify_password(hash: &str, password: &str) -> AppResult<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password(&hash, "correct horse").unwrap());
        assert!(!verify_password(&hash, "wrong horse").unwrap());
    }

    #[test]
    fn test_corrupt_hash_is_an_error() {
        assert!(verify_password("not-a-hash", "x").is_err());
    }
}
