//! Error types for the Clickgate service.

use thiserror::Error;

/// Main error type for Clickgate operations.
#[derive(Error, Debug)]
pub enum ClickgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Counter store errors
    #[error("Counter store error: {0}")]
    CounterStore(#[from] crate::ratelimit::StoreError),

    /// Relational store errors
    #[error("Repository error: {0}")]
    Repository(#[from] crate::db::RepositoryError),

    /// Password hashing errors
    #[error("Password hashing error: {0}")]
    Password(String),

    /// Database migration errors
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for ClickgateError {
    fn from(err: config::ConfigError) -> Self {
        ClickgateError::Config(err.to_string())
    }
}

/// Result type alias for Clickgate operations.
pub type Result<T> = std::result::Result<T, ClickgateError>;
