//! PostgreSQL-backed relational store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use super::model::{ClickEvent, LinkWithAnalytics, NewClickEvent, NewLink, NewUser, ShortLink, User};
use super::{LinkRepository, RepoResult, RepositoryError, UserRepository};
use crate::config::DatabaseConfig;
use crate::error::{ClickgateError, Result};

const LINK_COLUMNS: &str =
    "id, domain, key, url, password, clicks, last_clicked, user_id, created_at";
const EVENT_COLUMNS: &str = "id, link_id, device, browser, os, referer, \"timestamp\"";
const USER_COLUMNS: &str = "id, name, email, password, plan, created_at";

/// Relational store backed by a PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect using the database configuration, applying migrations if enabled.
    pub async fn connect(url: &str, config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(url)
            .await
            .map_err(RepositoryError::from)?;

        info!(max_connections = config.max_connections, "Connected to PostgreSQL");

        if config.run_migrations {
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(ClickgateError::from)?;
            info!("Database migrations applied");
        }

        Ok(Self::new(pool))
    }
}

/// Map a unique-constraint violation to `Conflict`.
fn conflict_or(err: sqlx::Error, what: String) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            RepositoryError::Conflict(what)
        }
        _ => RepositoryError::Database(err),
    }
}

#[async_trait]
impl LinkRepository for PgRepository {
    async fn find_link(&self, domain: &str, key: &str) -> RepoResult<Option<ShortLink>> {
        let sql = format!("SELECT {LINK_COLUMNS} FROM links WHERE domain = $1 AND key = $2");
        let link = sqlx::query_as::<_, ShortLink>(&sql)
            .bind(domain)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(link)
    }

    async fn find_link_by_key(&self, key: &str) -> RepoResult<Option<ShortLink>> {
        let sql = format!(
            "SELECT {LINK_COLUMNS} FROM links WHERE key = $1 ORDER BY created_at ASC LIMIT 1"
        );
        let link = sqlx::query_as::<_, ShortLink>(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(link)
    }

    async fn find_link_by_id(&self, id: Uuid) -> RepoResult<Option<ShortLink>> {
        let sql = format!("SELECT {LINK_COLUMNS} FROM links WHERE id = $1");
        let link = sqlx::query_as::<_, ShortLink>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(link)
    }

    async fn create_link(&self, link: NewLink) -> RepoResult<ShortLink> {
        let sql = format!(
            "INSERT INTO links (id, domain, key, url, password, user_id) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {LINK_COLUMNS}"
        );
        let what = format!("link {}/{}", link.domain, link.key);
        sqlx::query_as::<_, ShortLink>(&sql)
            .bind(Uuid::new_v4())
            .bind(&link.domain)
            .bind(&link.key)
            .bind(&link.url)
            .bind(&link.password_hash)
            .bind(link.user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| conflict_or(e, what))
    }

    async fn delete_link(&self, id: Uuid) -> RepoResult<bool> {
        // link_analytics rows go with it via ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM links WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_links(&self, user_id: Uuid) -> RepoResult<Vec<ShortLink>> {
        let sql =
            format!("SELECT {LINK_COLUMNS} FROM links WHERE user_id = $1 ORDER BY created_at DESC");
        let links = sqlx::query_as::<_, ShortLink>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(links)
    }

    async fn record_click(&self, link_id: Uuid, at: DateTime<Utc>) -> RepoResult<()> {
        sqlx::query("UPDATE links SET clicks = clicks + 1, last_clicked = $2 WHERE id = $1")
            .bind(link_id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_click_event(&self, event: NewClickEvent) -> RepoResult<ClickEvent> {
        let sql = format!(
            "INSERT INTO link_analytics (id, link_id, device, browser, os, referer, \"timestamp\") \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {EVENT_COLUMNS}"
        );
        let record = sqlx::query_as::<_, ClickEvent>(&sql)
            .bind(Uuid::new_v4())
            .bind(event.link_id)
            .bind(&event.device)
            .bind(&event.browser)
            .bind(&event.os)
            .bind(&event.referer)
            .bind(event.timestamp)
            .fetch_one(&self.pool)
            .await?;
        Ok(record)
    }

    async fn recent_click_events(&self, link_id: Uuid, limit: usize) -> RepoResult<Vec<ClickEvent>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM link_analytics WHERE link_id = $1 \
             ORDER BY \"timestamp\" DESC LIMIT $2"
        );
        let events = sqlx::query_as::<_, ClickEvent>(&sql)
            .bind(link_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(events)
    }

    async fn links_with_analytics(&self, user_id: Uuid) -> RepoResult<Vec<LinkWithAnalytics>> {
        let links = self.list_links(user_id).await?;
        if links.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = links.iter().map(|l| l.id).collect();
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM link_analytics WHERE link_id = ANY($1) \
             ORDER BY \"timestamp\" DESC"
        );
        let events = sqlx::query_as::<_, ClickEvent>(&sql)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;

        debug!(links = links.len(), events = events.len(), "Loaded analytics");

        let mut by_link: HashMap<Uuid, Vec<ClickEvent>> = HashMap::new();
        for event in events {
            by_link.entry(event.link_id).or_default().push(event);
        }

        Ok(links
            .into_iter()
            .map(|link| {
                let analytics = by_link.remove(&link.id).unwrap_or_default();
                LinkWithAnalytics { link, analytics }
            })
            .collect())
    }

    async fn ping(&self) -> RepoResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl UserRepository for PgRepository {
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let sql = format!(
            "INSERT INTO users (id, name, email, password) VALUES ($1, $2, $3, $4) \
             RETURNING {USER_COLUMNS}"
        );
        let what = format!("user {}", user.email);
        sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| conflict_or(e, what))
    }

    async fn update_user_password(&self, id: Uuid, password_hash: &str) -> RepoResult<bool> {
        let result = sqlx::query("UPDATE users SET password = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
