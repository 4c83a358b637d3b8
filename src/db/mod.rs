//! Relational store access: links, click events and accounts.

mod memory;
mod model;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub use memory::InMemoryRepository;
pub use model::{ClickEvent, LinkWithAnalytics, NewClickEvent, NewLink, NewUser, ShortLink, User};
pub use postgres::PgRepository;

/// Errors raised by the relational store.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Duplicate entry: {0}")]
    Conflict(String),
    #[error("Repository unavailable: {0}")]
    Unavailable(String),
}

/// Result type for repository operations.
pub type RepoResult<T> = std::result::Result<T, RepositoryError>;

/// Storage of short links and their click events.
#[async_trait]
pub trait LinkRepository: Send + Sync {
    /// Find a link by its `(domain, key)` pair.
    async fn find_link(&self, domain: &str, key: &str) -> RepoResult<Option<ShortLink>>;

    /// Find the oldest link with the given key in any domain.
    async fn find_link_by_key(&self, key: &str) -> RepoResult<Option<ShortLink>>;

    async fn find_link_by_id(&self, id: Uuid) -> RepoResult<Option<ShortLink>>;

    /// Insert a link. Fails with `Conflict` if `(domain, key)` is taken.
    async fn create_link(&self, link: NewLink) -> RepoResult<ShortLink>;

    /// Delete a link and its click events. Returns whether it existed.
    async fn delete_link(&self, id: Uuid) -> RepoResult<bool>;

    /// Links owned by a user, newest first.
    async fn list_links(&self, user_id: Uuid) -> RepoResult<Vec<ShortLink>>;

    /// Atomically add one click and stamp the last-clicked time.
    async fn record_click(&self, link_id: Uuid, at: DateTime<Utc>) -> RepoResult<()>;

    /// Append a click event.
    async fn append_click_event(&self, event: NewClickEvent) -> RepoResult<ClickEvent>;

    /// Most recent click events of a link, newest first.
    async fn recent_click_events(&self, link_id: Uuid, limit: usize) -> RepoResult<Vec<ClickEvent>>;

    /// Every link of a user with all its click events, newest first.
    async fn links_with_analytics(&self, user_id: Uuid) -> RepoResult<Vec<LinkWithAnalytics>>;

    /// Check that the store is reachable.
    async fn ping(&self) -> RepoResult<()>;
}

/// Storage of accounts.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;

    /// Insert an account. Fails with `Conflict` if the email is taken.
    async fn create_user(&self, user: NewUser) -> RepoResult<User>;

    /// Replace an account's password hash. Returns whether the account exists.
    async fn update_user_password(&self, id: Uuid, password_hash: &str) -> RepoResult<bool>;
}
