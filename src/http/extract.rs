//! Request extractors and per-request helpers.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use tracing::debug;

use super::error::ApiError;
use super::state::AppState;
use crate::db::User;
use crate::links::ClientMeta;
use crate::ratelimit::{RateLimitDecision, RateLimitIdentifier};

/// Address used when no proxy header names the client.
const FALLBACK_CLIENT_IP: &str = "127.0.0.1";

/// Email of the authenticated principal, taken from the trusted header set
/// by the upstream session provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal(pub String);

#[async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(state.settings.principal_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Principal(v.to_string()))
            .ok_or(ApiError::Unauthorized)
    }
}

/// Client address: first `X-Forwarded-For` entry, then `X-Real-IP`.
pub fn client_ip(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .unwrap_or(FALLBACK_CLIENT_IP)
        .to_string()
}

/// User agent and referer of the request.
pub fn client_meta(headers: &HeaderMap) -> ClientMeta {
    let text = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    ClientMeta::new(text(header::USER_AGENT), text(header::REFERER))
}

/// Consume one request from the identifier's quota, rejecting with 429
/// when it is exhausted.
pub async fn enforce_quota(
    state: &AppState,
    identifier: RateLimitIdentifier,
    message: &'static str,
) -> Result<RateLimitDecision, ApiError> {
    let quota = state.quotas.get(identifier.class);
    let decision = state.limiter.check_and_consume(&identifier, &quota).await;

    if decision.admitted {
        Ok(decision)
    } else {
        debug!(identifier = %identifier, reset_secs = decision.reset_secs, "Request rate limited");
        Err(ApiError::RateLimited { decision, message })
    }
}

/// The account behind an authenticated principal.
pub async fn current_user(state: &AppState, principal: &Principal) -> Result<User, ApiError> {
    state
        .accounts
        .find_by_email(&principal.0)
        .await?
        .ok_or(ApiError::NotFound("User not found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(*value));
        }
        map
    }

    #[test]
    fn test_client_ip_precedence() {
        assert_eq!(
            client_ip(&headers(&[
                ("x-forwarded-for", "203.0.113.7, 10.0.0.1"),
                ("x-real-ip", "198.51.100.2"),
            ])),
            "203.0.113.7"
        );
        assert_eq!(client_ip(&headers(&[("x-real-ip", "198.51.100.2")])), "198.51.100.2");
        assert_eq!(client_ip(&HeaderMap::new()), "127.0.0.1");
    }

    #[test]
    fn test_client_meta() {
        let meta = client_meta(&headers(&[
            ("user-agent", "curl/8.4.0"),
            ("referer", "https://example.com/"),
        ]));
        assert_eq!(meta.user_agent.as_deref(), Some("curl/8.4.0"));
        assert_eq!(meta.referer.as_deref(), Some("https://example.com/"));
        assert_eq!(client_meta(&HeaderMap::new()), ClientMeta::default());
    }
}
