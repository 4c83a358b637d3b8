//! Shared handler state.

use std::sync::Arc;

use crate::accounts::AccountService;
use crate::analytics::AnalyticsService;
use crate::config::ClickgateConfig;
use crate::db::{LinkRepository, UserRepository};
use crate::links::{ClickRecorder, LinkService};
use crate::ratelimit::{QuotaTable, SlidingWindowLimiter};

/// Everything a handler needs, cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<SlidingWindowLimiter>,
    pub quotas: QuotaTable,
    pub recorder: Arc<ClickRecorder>,
    pub links: Arc<LinkService>,
    pub analytics: Arc<AnalyticsService>,
    pub accounts: Arc<AccountService>,
    pub repository: Arc<dyn LinkRepository>,
    pub settings: Arc<HttpSettings>,
}

/// Request-independent HTTP settings.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Where unknown short keys are redirected
    pub not_found_url: String,
    /// Domain used when a redirect does not name one
    pub default_domain: String,
    /// Header carrying the authenticated principal's email
    pub principal_header: String,
}

impl AppState {
    /// Wire services over the given stores.
    pub fn new(
        config: &ClickgateConfig,
        limiter: Arc<SlidingWindowLimiter>,
        links: Arc<dyn LinkRepository>,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        let recorder = ClickRecorder::new(links.clone()).with_scope(config.links.redirect_scope);

        Self {
            limiter,
            quotas: config.rate_limiting.quotas,
            recorder: Arc::new(recorder),
            links: Arc::new(LinkService::new(links.clone(), config.links.default_domain.clone())),
            analytics: Arc::new(AnalyticsService::new(links.clone())),
            accounts: Arc::new(AccountService::new(users)),
            repository: links,
            settings: Arc::new(HttpSettings {
                not_found_url: config.server.not_found_url.clone(),
                default_domain: config.links.default_domain.clone(),
                principal_header: config.server.principal_header.to_ascii_lowercase(),
            }),
        }
    }
}
