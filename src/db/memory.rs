//! In-process relational store.
//!
//! Used for tests and for running a single node without PostgreSQL. All
//! mutations happen under one lock, which gives the same atomicity the SQL
//! store gets from single-statement updates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

use super::model::{ClickEvent, LinkWithAnalytics, NewClickEvent, NewLink, NewUser, ShortLink, User};
use super::{LinkRepository, RepoResult, RepositoryError, UserRepository};

#[derive(Debug, Default)]
struct Tables {
    links: HashMap<Uuid, ShortLink>,
    events: Vec<ClickEvent>,
    users: HashMap<Uuid, User>,
}

impl Tables {
    /// Events of one link, newest first.
    fn events_for(&self, link_id: Uuid) -> Vec<ClickEvent> {
        let mut events: Vec<ClickEvent> = self
            .events
            .iter()
            .filter(|e| e.link_id == link_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        events
    }

    fn links_of(&self, user_id: Uuid) -> Vec<ShortLink> {
        let mut links: Vec<ShortLink> = self
            .links
            .values()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect();
        links.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        links
    }
}

/// Relational store held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored click events.
    pub fn click_event_count(&self) -> usize {
        self.tables.lock().events.len()
    }
}

#[async_trait]
impl LinkRepository for InMemoryRepository {
    async fn find_link(&self, domain: &str, key: &str) -> RepoResult<Option<ShortLink>> {
        let tables = self.tables.lock();
        Ok(tables
            .links
            .values()
            .find(|l| l.domain == domain && l.key == key)
            .cloned())
    }

    async fn find_link_by_key(&self, key: &str) -> RepoResult<Option<ShortLink>> {
        let tables = self.tables.lock();
        Ok(tables
            .links
            .values()
            .filter(|l| l.key == key)
            .min_by_key(|l| l.created_at)
            .cloned())
    }

    async fn find_link_by_id(&self, id: Uuid) -> RepoResult<Option<ShortLink>> {
        Ok(self.tables.lock().links.get(&id).cloned())
    }

    async fn create_link(&self, link: NewLink) -> RepoResult<ShortLink> {
        let mut tables = self.tables.lock();
        let taken = tables
            .links
            .values()
            .any(|l| l.domain == link.domain && l.key == link.key);
        if taken {
            return Err(RepositoryError::Conflict(format!(
                "link {}/{}",
                link.domain, link.key
            )));
        }

        let record = ShortLink {
            id: Uuid::new_v4(),
            domain: link.domain,
            key: link.key,
            url: link.url,
            password: link.password_hash,
            clicks: 0,
            last_clicked: None,
            user_id: link.user_id,
            created_at: Utc::now(),
        };
        tables.links.insert(record.id, record.clone());
        Ok(record)
    }

    async fn delete_link(&self, id: Uuid) -> RepoResult<bool> {
        let mut tables = self.tables.lock();
        let existed = tables.links.remove(&id).is_some();
        if existed {
            tables.events.retain(|e| e.link_id != id);
        }
        Ok(existed)
    }

    async fn list_links(&self, user_id: Uuid) -> RepoResult<Vec<ShortLink>> {
        Ok(self.tables.lock().links_of(user_id))
    }

    async fn record_click(&self, link_id: Uuid, at: DateTime<Utc>) -> RepoResult<()> {
        let mut tables = self.tables.lock();
        if let Some(link) = tables.links.get_mut(&link_id) {
            link.clicks += 1;
            link.last_clicked = Some(at);
        }
        Ok(())
    }

    async fn append_click_event(&self, event: NewClickEvent) -> RepoResult<ClickEvent> {
        let record = ClickEvent {
            id: Uuid::new_v4(),
            link_id: event.link_id,
            device: event.device,
            browser: event.browser,
            os: event.os,
            referer: event.referer,
            timestamp: event.timestamp,
        };
        self.tables.lock().events.push(record.clone());
        Ok(record)
    }

    async fn recent_click_events(&self, link_id: Uuid, limit: usize) -> RepoResult<Vec<ClickEvent>> {
        let mut events = self.tables.lock().events_for(link_id);
        events.truncate(limit);
        Ok(events)
    }

    async fn links_with_analytics(&self, user_id: Uuid) -> RepoResult<Vec<LinkWithAnalytics>> {
        let tables = self.tables.lock();
        Ok(tables
            .links_of(user_id)
            .into_iter()
            .map(|link| {
                let analytics = tables.events_for(link.id);
                LinkWithAnalytics { link, analytics }
            })
            .collect())
    }

    async fn ping(&self) -> RepoResult<()> {
        Ok(())
    }
}

#[async_trait]
impl UserRepository for InMemoryRepository {
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let tables = self.tables.lock();
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let mut tables = self.tables.lock();
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(RepositoryError::Conflict(format!("user {}", user.email)));
        }

        let record = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password: user.password_hash,
            plan: "free".to_string(),
            created_at: Utc::now(),
        };
        tables.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_user_password(&self, id: Uuid, password_hash: &str) -> RepoResult<bool> {
        let mut tables = self.tables.lock();
        match tables.users.get_mut(&id) {
            Some(user) => {
                user.password = password_hash.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
