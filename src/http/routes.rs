//! Route table.

use axum::{
    routing::{get, patch, post},
    Router,
};

use super::handlers;
use super::state::AppState;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/links", post(handlers::create_link).get(handlers::list_links))
        .route("/api/links/redirect", get(handlers::redirect))
        .route(
            "/api/links/:id",
            get(handlers::get_link).delete(handlers::delete_link),
        )
        .route("/api/analytics", get(handlers::analytics))
        .route("/api/dashboard/stats", get(handlers::dashboard_stats))
        .route("/api/user/password", patch(handlers::change_password))
        .route("/api/auth/register", post(handlers::register))
        .route("/api/auth/sign-in", post(handlers::sign_in))
        .route("/api/health", get(handlers::health))
        .with_state(state)
}
