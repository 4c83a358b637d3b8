//! Endpoint handlers.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::error::ApiError;
use super::extract::{client_ip, client_meta, current_user, enforce_quota, Principal};
use super::state::AppState;
use crate::links::{CreateLink, RedirectOutcome};
use crate::ratelimit::{QuotaClass, RateLimitIdentifier, StoreHealth};

const SLOW_DOWN: &str = "Rate limit exceeded. Please slow down.";
const TOO_MANY_REGISTRATIONS: &str = "Too many registration attempts. Please try again later.";
const TOO_MANY_SIGN_INS: &str = "Too many login attempts. Please try again later.";
const TOO_MANY_PASSWORD_CHANGES: &str = "Too many password change attempts. Please try again later.";

/// Query of the public redirect endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct RedirectQuery {
    pub key: Option<String>,
    pub password: Option<String>,
    pub domain: Option<String>,
}

/// `GET /api/links/redirect`
#[instrument(skip_all)]
pub async fn redirect(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<RedirectQuery>,
) -> Result<Response, ApiError> {
    let identifier = RateLimitIdentifier::new(QuotaClass::Api)
        .with("redirect")
        .with(client_ip(&headers));
    enforce_quota(&state, identifier, SLOW_DOWN).await?;

    let key = query
        .key
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Key is required".to_string()))?;
    let domain = query
        .domain
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| state.settings.default_domain.clone());

    let outcome = state
        .recorder
        .resolve(&key, &domain, query.password.as_deref(), &client_meta(&headers))
        .await?;

    match outcome {
        RedirectOutcome::Resolved { url } => temporary_redirect(&url),
        RedirectOutcome::NotFound => temporary_redirect(&state.settings.not_found_url),
        RedirectOutcome::PasswordRequired(challenge) => Err(ApiError::PasswordRequired(challenge)),
    }
}

fn temporary_redirect(target: &str) -> Result<Response, ApiError> {
    let location = HeaderValue::from_str(target)
        .map_err(|e| ApiError::Internal(format!("Unusable redirect target: {}", e)))?;
    Ok((StatusCode::TEMPORARY_REDIRECT, [(header::LOCATION, location)]).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLinkBody {
    pub url: Option<String>,
    pub custom_key: Option<String>,
    pub password: Option<String>,
}

/// `POST /api/links`
pub async fn create_link(
    State(state): State<AppState>,
    principal: Principal,
    headers: HeaderMap,
    Json(body): Json<CreateLinkBody>,
) -> Result<Response, ApiError> {
    let identifier = RateLimitIdentifier::new(QuotaClass::Links)
        .with("create")
        .with(client_ip(&headers));
    enforce_quota(&state, identifier, SLOW_DOWN).await?;

    let user = current_user(&state, &principal).await?;
    let url = body
        .url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::BadRequest("URL is required".to_string()))?;

    let link = state
        .links
        .create(
            user.id,
            CreateLink {
                url,
                custom_key: body.custom_key,
                password: body.password,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "link": link }))).into_response())
}

/// `GET /api/links`
pub async fn list_links(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Response, ApiError> {
    let user = current_user(&state, &principal).await?;
    let links = state.links.list(user.id).await?;
    Ok(Json(json!({ "links": links })).into_response())
}

/// `GET /api/links/:id`
pub async fn get_link(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let link = state.links.get(id).await?;
    Ok(Json(json!({ "link": link })).into_response())
}

/// `DELETE /api/links/:id`
pub async fn delete_link(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let user = current_user(&state, &principal).await?;
    state.links.delete(user.id, id).await?;
    Ok(Json(json!({ "success": true })).into_response())
}

/// `GET /api/analytics`
pub async fn analytics(
    State(state): State<AppState>,
    principal: Principal,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let identifier = RateLimitIdentifier::new(QuotaClass::Analytics).with(client_ip(&headers));
    enforce_quota(&state, identifier, SLOW_DOWN).await?;

    let user = current_user(&state, &principal).await?;
    let report = state.analytics.report(user.id).await?;
    Ok(Json(report).into_response())
}

/// `GET /api/dashboard/stats`
pub async fn dashboard_stats(
    State(state): State<AppState>,
    principal: Principal,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let identifier = RateLimitIdentifier::new(QuotaClass::Analytics)
        .with("dashboard")
        .with(client_ip(&headers));
    enforce_quota(&state, identifier, SLOW_DOWN).await?;

    let user = current_user(&state, &principal).await?;
    let dashboard = state.analytics.dashboard(user.id).await?;
    Ok(Json(dashboard).into_response())
}

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// `POST /api/auth/register`
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RegisterBody>,
) -> Result<Response, ApiError> {
    let identifier = RateLimitIdentifier::new(QuotaClass::Auth)
        .with("register")
        .with(client_ip(&headers));
    enforce_quota(&state, identifier, TOO_MANY_REGISTRATIONS).await?;

    let user = state
        .accounts
        .register(&body.name, &body.email, &body.password)
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "user": user }))).into_response())
}

#[derive(Debug, Deserialize)]
pub struct SignInBody {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// `POST /api/auth/sign-in`
pub async fn sign_in(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SignInBody>,
) -> Result<Response, ApiError> {
    if body.email.is_empty() || body.password.is_empty() {
        return Err(ApiError::InvalidCredentials);
    }

    let identifier = RateLimitIdentifier::new(QuotaClass::Auth)
        .with("signin")
        .with(client_ip(&headers))
        .with(body.email.as_str());
    enforce_quota(&state, identifier, TOO_MANY_SIGN_INS).await?;

    let user = state.accounts.sign_in(&body.email, &body.password).await?;
    Ok(Json(json!({ "user": user })).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordBody {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

/// `PATCH /api/user/password`
pub async fn change_password(
    State(state): State<AppState>,
    principal: Principal,
    headers: HeaderMap,
    Json(body): Json<ChangePasswordBody>,
) -> Result<Response, ApiError> {
    let identifier = RateLimitIdentifier::new(QuotaClass::Auth)
        .with("password")
        .with(client_ip(&headers));
    enforce_quota(&state, identifier, TOO_MANY_PASSWORD_CHANGES).await?;

    let user = current_user(&state, &principal).await?;
    state
        .accounts
        .change_password(&user, &body.current_password, &body.new_password)
        .await?;

    Ok(Json(json!({ "message": "Password updated successfully" })).into_response())
}

/// `GET /api/health`
pub async fn health(State(state): State<AppState>) -> Response {
    let (database, redis) = futures::join!(state.repository.ping(), state.limiter.health());
    let database = match database {
        Ok(()) => "healthy",
        Err(e) => {
            debug!(error = %e, "Database health probe failed");
            "unhealthy"
        }
    };

    let degraded = database != "healthy" || redis == StoreHealth::Unhealthy;
    let (status, code) = if degraded {
        ("degraded", StatusCode::SERVICE_UNAVAILABLE)
    } else {
        ("healthy", StatusCode::OK)
    };

    let body = json!({
        "status": status,
        "timestamp": Utc::now().to_rfc3339(),
        "services": {
            "database": database,
            "redis": redis.as_str(),
            "api": "healthy",
        },
    });

    (code, Json(body)).into_response()
}
