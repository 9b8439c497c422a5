//! Health Check Module

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::core::ServerState;
use crate::utils::{AppResponse, AppResult, ok};

pub fn router() -> Router<ServerState> {
    Router::new().route("/api/health", get(health))
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    environment: String,
}

/// GET /api/health - liveness plus a DB round trip
async fn health(State(state): State<ServerState>) -> AppResult<Json<AppResponse<Health>>> {
    sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&state.pool)
        .await
        .map_err(crate::db::repository::RepoError::from)?;
    Ok(ok(Health {
        status: "ok",
        environment: state.config.environment.clone(),
    }))
}
