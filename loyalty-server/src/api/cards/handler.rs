//! Card Instance API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use crate::core::ServerState;
use crate::utils::{AppResponse, AppResult, ok_with_message};
use shared::models::{
    CardInstanceDetail, CodeScope, EarnEvent, IssuedCode, RewardRedemption, StampResult,
};

#[derive(Deserialize)]
pub struct ListQuery {
    pub user_id: i64,
}

/// GET /api/cards?user_id= - a user's cards with stamps and rewards
pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<CardInstanceDetail>>> {
    let cards = state.card_engine.list_cards(query.user_id).await?;
    Ok(Json(cards))
}

/// GET /api/cards/:id - one card with stamps and rewards
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<CardInstanceDetail>> {
    let detail = state.card_engine.card_detail(id).await?;
    Ok(Json(detail))
}

/// POST /api/cards/:id/code - issue or re-display the stamp code
pub async fn request_stamp_code(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<IssuedCode>> {
    let issued = state.card_engine.request_stamp_code(id).await?;
    Ok(Json(issued))
}

#[derive(Deserialize)]
pub struct RedeemStampRequest {
    pub code: String,
    /// Optional point-of-sale payload checked against template rules
    #[serde(default)]
    pub payload: Option<EarnEvent>,
}

/// POST /api/cards/redeem-stamp - consume a stamp code at POS
pub async fn redeem_stamp(
    State(state): State<ServerState>,
    Json(req): Json<RedeemStampRequest>,
) -> AppResult<Json<StampResult>> {
    let payload = req.payload.unwrap_or_default();
    let result = state.card_engine.redeem_stamp(&req.code, &payload).await?;
    Ok(Json(result))
}

/// POST /api/cards/:id/rewards/:link_id/code - issue or re-display
/// the reward claim code
pub async fn request_reward_code(
    State(state): State<ServerState>,
    Path((id, link_id)): Path<(i64, i64)>,
) -> AppResult<Json<IssuedCode>> {
    let issued = state.card_engine.request_reward_code(id, link_id).await?;
    Ok(Json(issued))
}

#[derive(Deserialize)]
pub struct RedeemRewardRequest {
    pub code: String,
}

/// POST /api/cards/redeem-reward - consume a reward code
pub async fn redeem_reward(
    State(state): State<ServerState>,
    Json(req): Json<RedeemRewardRequest>,
) -> AppResult<Json<RewardRedemption>> {
    let redemption = state.card_engine.redeem_reward(&req.code).await?;
    Ok(Json(redemption))
}

/// POST /api/cards/:id/code/revoke - admin revoke of the live stamp code
pub async fn revoke_stamp_code(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<AppResponse<bool>>> {
    let revoked = state
        .card_engine
        .revoke_code(CodeScope::StampConfirm, id)
        .await?;
    Ok(ok_with_message(revoked, "Stamp code revoked"))
}

/// POST /api/cards/:id/rewards/:link_id/code/revoke - admin revoke of
/// the live reward code
pub async fn revoke_reward_code(
    State(state): State<ServerState>,
    Path((_id, link_id)): Path<(i64, i64)>,
) -> AppResult<Json<AppResponse<bool>>> {
    let revoked = state
        .card_engine
        .revoke_code(CodeScope::RewardClaim, link_id)
        .await?;
    Ok(ok_with_message(revoked, "Reward code revoked"))
}
