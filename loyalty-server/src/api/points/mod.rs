//! Points Ledger API Module

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/points", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/events", post(handler::process_event))
        .route("/adjust", post(handler::adjust))
        .route("/balance", get(handler::balance))
        .route("/balance/recompute", post(handler::recompute_balance))
        .route("/transactions", get(handler::transactions))
}
