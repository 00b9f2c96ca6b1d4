//! API Routes
//!
//! Route definitions for all API endpoints.

use axum::{
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::state::AppState;

/// Create API v1 routes
pub fn api_v1_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/budget", budget_routes())
        .nest("/leases", lease_routes())
        .nest("/agents", agent_routes())
        .nest("/provider-keys", provider_key_routes())
}

/// Budget protocol routes
fn budget_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/handshake", post(handlers::budget::handshake))
        .route("/report", post(handlers::budget::report_usage))
        .route("/return", post(handlers::budget::return_lease))
        // Operator
        .route("/refresh", post(handlers::budget::refresh_budget))
        .route("/sweep", post(handlers::budget::sweep))
        // Budget requests
        .route(
            "/requests",
            post(handlers::requests::create_request).get(handlers::requests::list_requests),
        )
        .route("/requests/:request_id", get(handlers::requests::get_request))
        .route(
            "/requests/:request_id/approve",
            post(handlers::requests::approve_request),
        )
        .route(
            "/requests/:request_id/reject",
            post(handlers::requests::reject_request),
        )
        .route(
            "/requests/:request_id/cancel",
            post(handlers::requests::cancel_request),
        )
}

/// Lease routes
fn lease_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:lease_id", get(handlers::budget::get_lease))
        .route("/:lease_id/usage", get(handlers::budget::lease_usage))
        .route("/:lease_id/refresh", post(handlers::budget::refresh_lease))
        .route(
            "/:lease_id/discrepancies",
            get(handlers::budget::lease_discrepancies),
        )
        .route("/:lease_id/revoke", post(handlers::budget::revoke_lease))
}

/// Agent routes
fn agent_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(handlers::agents::register_agent))
        .route("/:agent_id/budget", get(handlers::agents::budget_status))
        .route("/:agent_id/history", get(handlers::agents::budget_history))
        .route("/:agent_id/leases", get(handlers::agents::list_leases))
        .route("/:agent_id/token", post(handlers::agents::issue_token))
        .route("/:agent_id/zero", post(handlers::agents::zero_budget))
}

/// Provider key routes (operator only)
fn provider_key_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/",
            post(handlers::keys::add_provider_key).get(handlers::keys::list_provider_keys),
        )
        .route(
            "/:key_id",
            patch(handlers::keys::set_provider_key_enabled),
        )
}
