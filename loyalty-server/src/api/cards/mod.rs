//! Card Instance API Module

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/cards", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/", get(handler::list))
        .route("/redeem-stamp", post(handler::redeem_stamp))
        .route("/redeem-reward", post(handler::redeem_reward))
        .route("/{id}", get(handler::get_by_id))
        .route("/{id}/code", post(handler::request_stamp_code))
        .route("/{id}/code/revoke", post(handler::revoke_stamp_code))
        .route(
            "/{id}/rewards/{link_id}/code",
            post(handler::request_reward_code),
        )
        .route(
            "/{id}/rewards/{link_id}/code/revoke",
            post(handler::revoke_reward_code),
        )
}
