//! HTTP error mapping.

use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::accounts::AccountError;
use crate::db::RepositoryError;
use crate::links::{LinkError, PasswordChallenge};
use crate::ratelimit::RateLimitDecision;

/// Errors returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Unauthorized")]
    Forbidden,

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("{}", password_message(.0))]
    PasswordRequired(PasswordChallenge),

    #[error("{message}")]
    RateLimited {
        decision: RateLimitDecision,
        message: &'static str,
    },

    /// Detail is logged and never sent to the client.
    #[error("Internal server error")]
    Internal(String),
}

fn password_message(challenge: &PasswordChallenge) -> &'static str {
    match challenge {
        PasswordChallenge::Missing => "Password required",
        PasswordChallenge::Invalid => "Invalid password",
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized
            | ApiError::InvalidCredentials
            | ApiError::PasswordRequired(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    requires_password: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Internal(detail) => error!(error = %detail, "Request failed"),
            ApiError::Forbidden | ApiError::InvalidCredentials => {
                warn!(error = %self, "Auth error")
            }
            _ => {}
        }

        let status = self.status_code();
        let mut body = ErrorBody {
            error: self.to_string(),
            requires_password: None,
            retry_after: None,
        };

        match &self {
            ApiError::PasswordRequired(_) => body.requires_password = Some(true),
            ApiError::RateLimited { decision, .. } => body.retry_after = Some(decision.reset_secs),
            _ => {}
        }

        let mut response = (status, Json(body)).into_response();
        if let ApiError::RateLimited { decision, .. } = &self {
            add_rate_limit_headers(response.headers_mut(), decision);
        }
        response
    }
}

fn add_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(header::RETRY_AFTER, HeaderValue::from(decision.reset_secs));
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(decision.reset_secs));
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<LinkError> for ApiError {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::InvalidUrl | LinkError::InvalidKey => ApiError::BadRequest(err.to_string()),
            LinkError::KeyTaken => ApiError::Conflict(err.to_string()),
            LinkError::NotFound => ApiError::NotFound("Link not found"),
            LinkError::Forbidden => ApiError::Forbidden,
            LinkError::Repository(e) => ApiError::Internal(e.to_string()),
            LinkError::Internal(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::MissingFields
            | AccountError::PasswordChangeIncomplete
            | AccountError::PasswordTooShort
            | AccountError::IncorrectPassword => ApiError::BadRequest(err.to_string()),
            AccountError::EmailTaken => ApiError::Conflict(err.to_string()),
            AccountError::InvalidCredentials => ApiError::InvalidCredentials,
            AccountError::UnknownUser => ApiError::NotFound("User not found"),
            AccountError::Repository(e) => ApiError::Internal(e.to_string()),
            AccountError::Internal(e) => ApiError::Internal(e.to_string()),
        }
    }
}
