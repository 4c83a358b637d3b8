//! Records held by the relational store.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A short link: `(domain, key)` mapped to a destination URL.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ShortLink {
    pub id: Uuid,
    pub domain: String,
    pub key: String,
    pub url: String,
    /// Argon2 PHC string, never serialized
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub clicks: i64,
    pub last_clicked: Option<DateTime<Utc>>,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl ShortLink {
    /// Whether resolving this link requires a password.
    pub fn is_protected(&self) -> bool {
        self.password.is_some()
    }
}

/// Fields needed to create a link.
#[derive(Debug, Clone)]
pub struct NewLink {
    pub domain: String,
    pub key: String,
    pub url: String,
    pub password_hash: Option<String>,
    pub user_id: Uuid,
}

/// One recorded visit to a short link.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ClickEvent {
    pub id: Uuid,
    pub link_id: Uuid,
    pub device: String,
    pub browser: String,
    pub os: String,
    pub referer: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A click event before it is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewClickEvent {
    pub link_id: Uuid,
    pub device: String,
    pub browser: String,
    pub os: String,
    pub referer: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A link together with its click events, newest first.
#[derive(Debug, Clone)]
pub struct LinkWithAnalytics {
    pub link: ShortLink,
    pub analytics: Vec<ClickEvent>,
}

/// A registered account.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    /// Argon2 PHC string
    pub password: String,
    pub plan: String,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to create an account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}
