//! Multi-tenant fleet management for TVDE partners.

pub mod approvals;
pub mod auth;
pub mod commission;
pub mod config;
pub mod error;
pub mod fleet;
pub mod ingestion;
pub mod rpa;
pub mod state;
pub mod storage;
pub mod store;
pub mod telemetry;

use axum::Router;

pub use state::AppState;

/// Every `/api` route, bound to `state`.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .merge(auth::auth_router())
        .merge(fleet::fleet_router())
        .merge(ingestion::ingestion_router())
        .merge(commission::commission_router())
        .merge(approvals::approvals_router())
        .merge(rpa::rpa_router())
        .with_state(state)
}
