//! Redirect resolution and click accounting.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

use super::classify::{ClientInfo, ClientMeta};
use crate::clock::{Clock, SystemClock};
use crate::db::{LinkRepository, NewClickEvent, RepoResult, ShortLink};
use crate::password::verify_password_blocking;

/// How a redirect request is matched to a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectScope {
    /// Match on `(domain, key)`, consistent with creation-time uniqueness
    #[default]
    DomainAndKey,
    /// Match on the key alone; the oldest link wins when keys collide
    KeyOnly,
}

/// Why a protected link was not resolved.
///
/// The two cases get different client messages, so a redirect page can tell
/// whether to prompt for a password or report a wrong one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordChallenge {
    /// No password supplied
    Missing,
    /// Supplied password did not verify
    Invalid,
}

/// Result of resolving a short key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectOutcome {
    /// No link for the key
    NotFound,
    /// The link is protected and no valid password was supplied
    PasswordRequired(PasswordChallenge),
    /// The click was recorded; redirect to `url`
    Resolved { url: String },
}

/// Resolves short keys and records clicks.
pub struct ClickRecorder {
    repository: Arc<dyn LinkRepository>,
    clock: Arc<dyn Clock>,
    scope: RedirectScope,
}

impl ClickRecorder {
    /// Create a recorder using the system clock and domain-scoped lookup.
    pub fn new(repository: Arc<dyn LinkRepository>) -> Self {
        Self {
            repository,
            clock: Arc::new(SystemClock),
            scope: RedirectScope::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_scope(mut self, scope: RedirectScope) -> Self {
        self.scope = scope;
        self
    }

    /// Resolve `key` and, on success, record exactly one click.
    ///
    /// `NotFound` and `PasswordRequired` have no side effects. Relational
    /// store failures while looking up or counting are returned as errors.
    #[instrument(skip(self, supplied_password, meta), fields(scope = ?self.scope))]
    pub async fn resolve(
        &self,
        key: &str,
        domain: &str,
        supplied_password: Option<&str>,
        meta: &ClientMeta,
    ) -> RepoResult<RedirectOutcome> {
        let link = match self.lookup(key, domain).await? {
            Some(link) => link,
            None => {
                debug!("No link for key");
                return Ok(RedirectOutcome::NotFound);
            }
        };

        if let Some(challenge) = self.check_password(&link, supplied_password).await {
            debug!(link_id = %link.id, challenge = ?challenge, "Password check failed");
            return Ok(RedirectOutcome::PasswordRequired(challenge));
        }

        let client = ClientInfo::classify(meta);
        self.record(&link, client).await?;

        Ok(RedirectOutcome::Resolved { url: link.url })
    }

    async fn lookup(&self, key: &str, domain: &str) -> RepoResult<Option<ShortLink>> {
        match self.scope {
            RedirectScope::DomainAndKey => self.repository.find_link(domain, key).await,
            RedirectScope::KeyOnly => self.repository.find_link_by_key(key).await,
        }
    }

    /// Returns the challenge to issue, or `None` if the request may proceed.
    async fn check_password(
        &self,
        link: &ShortLink,
        supplied: Option<&str>,
    ) -> Option<PasswordChallenge> {
        let stored = link.password.as_ref()?;

        let supplied = match supplied {
            Some(p) if !p.is_empty() => p,
            _ => return Some(PasswordChallenge::Missing),
        };

        match verify_password_blocking(supplied.to_string(), stored.clone()).await {
            Ok(true) => None,
            Ok(false) => Some(PasswordChallenge::Invalid),
            Err(e) => {
                error!(link_id = %link.id, error = %e, "Stored link password could not be verified");
                Some(PasswordChallenge::Invalid)
            }
        }
    }

    /// Increment the click counter, then append the click event.
    ///
    /// The append is attempted even when the increment fails, and each
    /// failure is logged on its own. A failed increment fails the resolution; a failed append alone
    /// does not.
    async fn record(&self, link: &ShortLink, client: ClientInfo) -> RepoResult<()> {
        let now = self.clock.now();
        let event = NewClickEvent {
            link_id: link.id,
            device: client.device.as_str().to_string(),
            browser: client.browser.to_string(),
            os: client.os.to_string(),
            referer: client.referer,
            timestamp: now,
        };

        let counted = self.repository.record_click(link.id, now).await;
        if let Err(e) = &counted {
            error!(link_id = %link.id, error = %e, "Failed to increment click counter");
        }

        if let Err(e) = self.repository.append_click_event(event).await {
            warn!(link_id = %link.id, error = %e, "Failed to append click event");
        }

        counted
    }
}
