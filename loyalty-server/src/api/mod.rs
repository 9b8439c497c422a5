//! API Route Modules
//!
//! # Structure
//!
//! - [`health`] - liveness check
//! - [`templates`] - card template management and claims
//! - [`cards`] - card instances, stamp and reward codes
//! - [`rules`] - points rule management and eligibility status
//! - [`points`] - event processing, ledger and balances

pub mod cards;
pub mod health;
pub mod points;
pub mod rules;
pub mod templates;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::core::ServerState;

// Re-export common types for handlers
pub use crate::utils::{AppResponse, AppResult};

/// Assemble the full application router
pub fn router(state: ServerState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(templates::router())
        .merge(cards::router())
        .merge(rules::router())
        .merge(points::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
