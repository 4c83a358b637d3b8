//! Account registration and credential checks.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::db::{NewUser, RepositoryError, User, UserRepository};
use crate::error::ClickgateError;
use crate::password::{hash_password_blocking, verify_password_blocking};

/// Minimum length, in characters, of a changed password.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Errors from account operations.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Missing required fields")]
    MissingFields,

    #[error("Email already registered")]
    EmailTaken,

    /// Unknown email and wrong password are reported alike.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Current password and new password are required")]
    PasswordChangeIncomplete,

    #[error("Password must be at least 8 characters long")]
    PasswordTooShort,

    #[error("Current password is incorrect")]
    IncorrectPassword,

    #[error("User not found")]
    UnknownUser,

    #[error(transparent)]
    Repository(RepositoryError),

    #[error(transparent)]
    Internal(#[from] ClickgateError),
}

impl From<RepositoryError> for AccountError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(_) => AccountError::EmailTaken,
            other => AccountError::Repository(other),
        }
    }
}

/// Public view of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
        }
    }
}

/// Registration and sign-in.
pub struct AccountService {
    repository: Arc<dyn UserRepository>,
}

impl AccountService {
    pub fn new(repository: Arc<dyn UserRepository>) -> Self {
        Self { repository }
    }

    /// Create an account.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<UserSummary, AccountError> {
        if name.is_empty() || email.is_empty() || password.is_empty() {
            return Err(AccountError::MissingFields);
        }

        if self.repository.find_user_by_email(email).await?.is_some() {
            return Err(AccountError::EmailTaken);
        }

        let password_hash = hash_password_blocking(password.to_string()).await?;
        let user = self
            .repository
            .create_user(NewUser {
                name: name.to_string(),
                email: email.to_string(),
                password_hash,
            })
            .await?;

        info!(user_id = %user.id, "Account registered");
        Ok(user.into())
    }

    /// Check credentials and return the account they belong to.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserSummary, AccountError> {
        if email.is_empty() || password.is_empty() {
            return Err(AccountError::InvalidCredentials);
        }

        let user = match self.repository.find_user_by_email(email).await? {
            Some(user) => user,
            None => return Err(AccountError::InvalidCredentials),
        };

        match verify_password_blocking(password.to_string(), user.password.clone()).await {
            Ok(true) => Ok(user.into()),
            Ok(false) => Err(AccountError::InvalidCredentials),
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "Stored account password could not be verified");
                Err(AccountError::InvalidCredentials)
            }
        }
    }

    /// Replace `user`'s password after checking the current one.
    #[instrument(skip_all, fields(user_id = %user.id))]
    pub async fn change_password(
        &self,
        user: &User,
        current: &str,
        new: &str,
    ) -> Result<(), AccountError> {
        if current.is_empty() || new.is_empty() {
            return Err(AccountError::PasswordChangeIncomplete);
        }
        if new.chars().count() < MIN_PASSWORD_LEN {
            return Err(AccountError::PasswordTooShort);
        }

        match verify_password_blocking(current.to_string(), user.password.clone()).await {
            Ok(true) => {}
            Ok(false) => return Err(AccountError::IncorrectPassword),
            Err(e) => {
                warn!(error = %e, "Stored account password could not be verified");
                return Err(AccountError::IncorrectPassword);
            }
        }

        let password_hash = hash_password_blocking(new.to_string()).await?;
        if !self
            .repository
            .update_user_password(user.id, &password_hash)
            .await?
        {
            return Err(AccountError::UnknownUser);
        }

        info!("Account password changed");
        Ok(())
    }

    /// Resolve an authenticated principal's email to an account.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, AccountError> {
        Ok(self.repository.find_user_by_email(email).await?)
    }
}
