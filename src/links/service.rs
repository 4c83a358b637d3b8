//! Link creation, lookup, listing and deletion.

use rand::distributions::Uniform;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};
use url::Url;
use uuid::Uuid;

use crate::db::{ClickEvent, LinkRepository, NewLink, RepositoryError, ShortLink};
use crate::error::ClickgateError;
use crate::password::hash_password_blocking;

/// Characters used in generated and custom keys.
const KEY_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// Length of generated keys.
pub const GENERATED_KEY_LEN: usize = 8;

/// Upper bound on custom key length.
pub const MAX_CUSTOM_KEY_LEN: usize = 64;

/// Number of click events returned with a single link.
pub const RECENT_EVENT_LIMIT: usize = 100;

/// Errors from link management.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Invalid URL format")]
    InvalidUrl,

    #[error("Invalid custom key")]
    InvalidKey,

    #[error("This custom key is already taken")]
    KeyTaken,

    #[error("Link not found")]
    NotFound,

    #[error("Link belongs to another user")]
    Forbidden,

    #[error(transparent)]
    Repository(RepositoryError),

    #[error(transparent)]
    Internal(#[from] ClickgateError),
}

impl From<RepositoryError> for LinkError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(_) => LinkError::KeyTaken,
            other => LinkError::Repository(other),
        }
    }
}

/// Request to create a link.
#[derive(Debug, Clone, Default)]
pub struct CreateLink {
    pub url: String,
    pub custom_key: Option<String>,
    pub password: Option<String>,
}

/// A link as shown in listings: the password is reported only as present.
#[derive(Debug, Clone, Serialize)]
pub struct LinkListing {
    #[serde(flatten)]
    pub link: ShortLink,
    pub password: Option<&'static str>,
}

impl From<ShortLink> for LinkListing {
    fn from(link: ShortLink) -> Self {
        let password = link.is_protected().then_some("protected");
        Self { link, password }
    }
}

/// A link with its most recent click events.
#[derive(Debug, Clone, Serialize)]
pub struct LinkDetail {
    #[serde(flatten)]
    pub link: ShortLink,
    pub analytics: Vec<ClickEvent>,
}

/// Owner-facing link operations.
pub struct LinkService {
    repository: Arc<dyn LinkRepository>,
    domain: String,
}

impl LinkService {
    /// Create a service that places new links under `domain`.
    pub fn new(repository: Arc<dyn LinkRepository>, domain: impl Into<String>) -> Self {
        Self {
            repository,
            domain: domain.into(),
        }
    }

    /// Create a link owned by `owner`.
    #[instrument(skip(self, request), fields(domain = %self.domain))]
    pub async fn create(&self, owner: Uuid, request: CreateLink) -> Result<ShortLink, LinkError> {
        let url = validate_url(&request.url)?;

        let key = match request.custom_key.filter(|k| !k.is_empty()) {
            Some(key) => {
                validate_key(&key)?;
                key
            }
            None => generate_key(),
        };

        let password_hash = match request.password.filter(|p| !p.is_empty()) {
            Some(password) => Some(hash_password_blocking(password).await?),
            None => None,
        };

        let link = self
            .repository
            .create_link(NewLink {
                domain: self.domain.clone(),
                key,
                url: url.to_string(),
                password_hash,
                user_id: owner,
            })
            .await?;

        info!(link_id = %link.id, key = %link.key, protected = link.is_protected(), "Link created");
        Ok(link)
    }

    /// Delete a link owned by `owner`.
    #[instrument(skip(self))]
    pub async fn delete(&self, owner: Uuid, id: Uuid) -> Result<(), LinkError> {
        let link = self
            .repository
            .find_link_by_id(id)
            .await?
            .ok_or(LinkError::NotFound)?;

        if link.user_id != owner {
            debug!(owner = %link.user_id, "Delete refused for non-owner");
            return Err(LinkError::Forbidden);
        }

        if !self.repository.delete_link(id).await? {
            // Removed concurrently
            return Err(LinkError::NotFound);
        }

        info!(link_id = %id, "Link deleted");
        Ok(())
    }

    /// A link with its latest click events, newest first.
    pub async fn get(&self, id: Uuid) -> Result<LinkDetail, LinkError> {
        let link = self
            .repository
            .find_link_by_id(id)
            .await?
            .ok_or(LinkError::NotFound)?;
        let analytics = self
            .repository
            .recent_click_events(id, RECENT_EVENT_LIMIT)
            .await?;

        Ok(LinkDetail { link, analytics })
    }

    /// Links of `owner`, newest first.
    pub async fn list(&self, owner: Uuid) -> Result<Vec<LinkListing>, LinkError> {
        let links = self.repository.list_links(owner).await?;
        Ok(links.into_iter().map(LinkListing::from).collect())
    }
}

/// Parse a destination. The serialized `Url` is what gets stored: it is
/// percent-encoded ASCII and always usable as a `Location` header.
fn validate_url(raw: &str) -> Result<Url, LinkError> {
    let url = Url::parse(raw).map_err(|_| LinkError::InvalidUrl)?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        _ => Err(LinkError::InvalidUrl),
    }
}

fn validate_key(key: &str) -> Result<(), LinkError> {
    let valid = !key.is_empty()
        && key.len() <= MAX_CUSTOM_KEY_LEN
        && key.bytes().all(|b| KEY_ALPHABET.contains(&b));
    if valid {
        Ok(())
    } else {
        Err(LinkError::InvalidKey)
    }
}

fn generate_key() -> String {
    let dist = Uniform::from(0..KEY_ALPHABET.len());
    rand::thread_rng()
        .sample_iter(dist)
        .take(GENERATED_KEY_LEN)
        .map(|i| KEY_ALPHABET[i] as char)
        .collect()
}
