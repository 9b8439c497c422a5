//! Points Ledger API Handlers

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use crate::core::ServerState;
use crate::utils::AppResult;
use shared::models::{
    AdjustmentCreate, EarnEvent, EventOutcome, PointsBalance, PointsTransaction,
};

/// POST /api/points/events - run a business event through the active
/// rules of its company
pub async fn process_event(
    State(state): State<ServerState>,
    Json(event): Json<EarnEvent>,
) -> AppResult<Json<EventOutcome>> {
    let outcome = state.points_engine.process_event(&event).await?;
    Ok(Json(outcome))
}

/// POST /api/points/adjust - manual ledger adjustment
pub async fn adjust(
    State(state): State<ServerState>,
    Json(data): Json<AdjustmentCreate>,
) -> AppResult<Json<PointsTransaction>> {
    let tx = state.points_engine.adjust(data).await?;
    Ok(Json(tx))
}

#[derive(Deserialize)]
pub struct UserQuery {
    pub company_id: i64,
    pub user_id: i64,
}

/// GET /api/points/balance?company_id=&user_id=
pub async fn balance(
    State(state): State<ServerState>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<PointsBalance>> {
    let balance = state
        .points_engine
        .balance(query.company_id, query.user_id)
        .await?;
    Ok(Json(balance))
}

/// POST /api/points/balance/recompute - rebuild the projection from
/// the ledger
pub async fn recompute_balance(
    State(state): State<ServerState>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<i64>> {
    let balance = state
        .points_engine
        .recompute_balance(query.company_id, query.user_id)
        .await?;
    Ok(Json(balance))
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub company_id: i64,
    pub user_id: i64,
    pub limit: Option<i64>,
}

/// GET /api/points/transactions?company_id=&user_id=&limit=
pub async fn transactions(
    State(state): State<ServerState>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<PointsTransaction>>> {
    let cap = state.config.tx_page_limit;
    let limit = query.limit.unwrap_or(cap).clamp(1, cap);
    let txs = state
        .points_engine
        .transactions(query.company_id, query.user_id, limit)
        .await?;
    Ok(Json(txs))
}
