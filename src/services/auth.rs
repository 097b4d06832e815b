//! Account registration and password authentication

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    error::{AppError, AppResult},
    models::{fields::{into_record, now}, CreateUser, User, UserRole},
    repository::EntityManager,
};

const MIN_PASSWORD_LENGTH: usize = 4;

/// Registration request
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterUser {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: UserRole,
}

#[derive(Clone)]
pub struct AuthService {
    entities: Arc<EntityManager>,
}

impl AuthService {
    pub fn new(entities: Arc<EntityManager>) -> Self {
        Self { entities }
    }

    /// Create an account with a hashed password. Emails must be unique.
    pub async fn register(&self, request: RegisterUser) -> AppResult<User> {
        check_password(&request.password)?;

        let users = self.entities.get_repository::<User>()?;
        if !users
            .find_by(&into_record(json!({ "email": request.email })))
            .await
            .is_empty()
        {
            return Err(AppError::Conflict(format!(
                "Email {} is already registered",
                request.email
            )));
        }

        let mut user = User::create(CreateUser {
            name: request.name,
            email: request.email,
            role: request.role,
            ..Default::default()
        })?;
        user.password_hash = Some(self.hash_password(&request.password)?);

        if !users.save(&user).await {
            return Err(AppError::Internal("Failed to save user".to_string()));
        }

        tracing::info!("Registered user {} ({})", user.id, user.role);
        Ok(user)
    }

    /// Check credentials and record the login time.
    pub async fn authenticate(&self, email: &str, password: &str) -> AppResult<User> {
        let users = self.entities.get_repository::<User>()?;
        let mut user = users
            .find_by(&into_record(json!({ "email": email })))
            .await
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Authentication("Invalid email or password".to_string()))?;

        if !self.verify_password(&user, password)? {
            return Err(AppError::Authentication(
                "Invalid email or password".to_string(),
            ));
        }

        if !user.active {
            return Err(AppError::Authentication("Account is inactive".to_string()));
        }

        user.last_login = Some(now());
        if !users.save(&user).await {
            tracing::warn!("Could not record login time for user {}", user.id);
        }

        Ok(user)
    }

    /// Replace a password after checking the current one.
    pub async fn change_password(
        &self,
        user_id: &str,
        current_password: &str,
        new_password: &str,
    ) -> AppResult<()> {
        let users = self.entities.get_repository::<User>()?;
        let mut user = users
            .load(user_id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

        if !self.verify_password(&user, current_password)? {
            return Err(AppError::Authentication(
                "Current password is incorrect".to_string(),
            ));
        }

        self.set_password(&mut user, new_password)?;
        if !users.save(&user).await {
            return Err(AppError::Internal("Failed to save user".to_string()));
        }

        tracing::info!("Password changed for user {}", user.id);
        Ok(())
    }

    /// Disable an account. Only an administrator may do it, and not on their own account.
    pub async fn deactivate_user(&self, user_id: &str, admin_id: &str) -> AppResult<User> {
        let users = self.entities.get_repository::<User>()?;
        let is_admin = users
            .load(admin_id)
            .await
            .map_or(false, |admin| admin.active && admin.role == UserRole::Admin);
        if !is_admin {
            return Err(AppError::Authentication(
                "Only administrators may deactivate users".to_string(),
            ));
        }
        if user_id == admin_id {
            return Err(AppError::BusinessRule(
                "Administrators cannot deactivate their own account".to_string(),
            ));
        }

        let mut user = users
            .load(user_id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;
        user.active = false;
        user.updated_at = now();
        if !users.save(&user).await {
            return Err(AppError::Internal("Failed to save user".to_string()));
        }

        tracing::info!("User {} deactivated by {}", user.id, admin_id);
        Ok(user)
    }

    /// Set a new password for the account registered under `email`.
    /// Returns false for an unknown email; callers should not reveal which.
    pub async fn reset_password(&self, email: &str, new_password: &str) -> AppResult<bool> {
        check_password(new_password)?;

        let users = self.entities.get_repository::<User>()?;
        let Some(mut user) = users
            .find_by(&into_record(json!({ "email": email })))
            .await
            .into_iter()
            .next()
        else {
            tracing::debug!("Password reset requested for unknown email");
            return Ok(false);
        };

        self.set_password(&mut user, new_password)?;
        if !users.save(&user).await {
            return Err(AppError::Internal("Failed to save user".to_string()));
        }

        tracing::info!("Password reset for user {}", user.id);
        Ok(true)
    }

    fn set_password(&self, user: &mut User, password: &str) -> AppResult<()> {
        check_password(password)?;
        user.password_hash = Some(self.hash_password(password)?);
        user.updated_at = now();
        Ok(())
    }

    /// Verify user password
    fn verify_password(&self, user: &User, password: &str) -> AppResult<bool> {
        if let Some(ref hash) = user.password_hash {
            let parsed_hash = PasswordHash::new(hash)
                .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
            return Ok(Argon2::default()
                .verify_password(password.as_bytes(), &parsed_hash)
                .is_ok());
        }

        Ok(false)
    }

    /// Hash a password using Argon2
    pub fn hash_password(&self, password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();
        let hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
        Ok(hash.to_string())
    }
}

fn check_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}
