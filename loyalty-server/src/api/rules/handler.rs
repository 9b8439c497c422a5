//! Points Rule API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use crate::core::ServerState;
use crate::db::repository::rule;
use crate::utils::{AppError, AppResponse, AppResult, ok_with_message};
use shared::models::{PointsRule, PointsRuleCreate, PointsRuleUpdate, RuleStatus};

#[derive(Deserialize)]
pub struct ListQuery {
    pub company_id: i64,
}

/// GET /api/rules?company_id= - all rules of a company
pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<PointsRule>>> {
    let rules = rule::find_all(&state.pool, query.company_id).await?;
    Ok(Json(rules))
}

/// GET /api/rules/:id
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<PointsRule>> {
    let rule = rule::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Rule {id} not found")))?;
    Ok(Json(rule))
}

/// POST /api/rules - create a rule; the config is validated for its
/// rule_type before anything is stored
pub async fn create(
    State(state): State<ServerState>,
    Json(data): Json<PointsRuleCreate>,
) -> AppResult<Json<PointsRule>> {
    let rule = rule::create(&state.pool, data).await?;
    Ok(Json(rule))
}

/// PUT /api/rules/:id - update flags, ordering, or replace the config
pub async fn update(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Json(data): Json<PointsRuleUpdate>,
) -> AppResult<Json<PointsRule>> {
    let rule = rule::update(&state.pool, id, data).await?;
    Ok(Json(rule))
}

/// DELETE /api/rules/:id - deactivate; history keeps referencing it
pub async fn delete(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<AppResponse<bool>>> {
    let removed = rule::delete(&state.pool, id).await?;
    if !removed {
        return Err(AppError::NotFound(format!("Rule {id} not found")));
    }
    Ok(ok_with_message(true, "Rule deactivated"))
}

#[derive(Deserialize)]
pub struct StatusQuery {
    pub user_id: i64,
}

/// GET /api/rules/:id/status?user_id= - would this user currently
/// qualify
pub async fn status(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Query(query): Query<StatusQuery>,
) -> AppResult<Json<RuleStatus>> {
    let status = state
        .points_engine
        .check_rule_status(id, query.user_id)
        .await?;
    Ok(Json(status))
}
