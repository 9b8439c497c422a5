//! Card Template API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use crate::core::ServerState;
use crate::db::repository::template;
use crate::utils::{AppError, AppResponse, AppResult, ok_with_message};
use shared::models::{
    CardInstance, CardTemplate, CardTemplateCreate, CardTemplateDetail, CardTemplateUpdate,
};

#[derive(Deserialize)]
pub struct ListQuery {
    pub company_id: Option<i64>,
}

/// GET /api/templates - list active templates, optionally by company
pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<CardTemplate>>> {
    let templates = template::find_all(&state.pool, query.company_id).await?;
    Ok(Json(templates))
}

/// GET /api/templates/:id - template with rewards and rules
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<CardTemplateDetail>> {
    let detail = template::find_detail(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Template {id} not found")))?;
    Ok(Json(detail))
}

/// POST /api/templates - create a template with its reward map
pub async fn create(
    State(state): State<ServerState>,
    Json(data): Json<CardTemplateCreate>,
) -> AppResult<Json<CardTemplateDetail>> {
    let detail = template::create(&state.pool, data).await?;
    Ok(Json(detail))
}

/// PUT /api/templates/:id - update template metadata
pub async fn update(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Json(data): Json<CardTemplateUpdate>,
) -> AppResult<Json<CardTemplate>> {
    let updated = template::update(&state.pool, id, data).await?;
    Ok(Json(updated))
}

/// DELETE /api/templates/:id - deactivate (instances are kept)
pub async fn delete(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<AppResponse<bool>>> {
    let removed = template::delete(&state.pool, id).await?;
    if !removed {
        return Err(AppError::NotFound(format!("Template {id} not found")));
    }
    Ok(ok_with_message(true, "Template deactivated"))
}

#[derive(Deserialize)]
pub struct ClaimRequest {
    pub user_id: i64,
}

/// POST /api/templates/:id/claim - claim a card instance
pub async fn claim(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Json(req): Json<ClaimRequest>,
) -> AppResult<Json<CardInstance>> {
    let instance = state.card_engine.claim(id, req.user_id).await?;
    Ok(Json(instance))
}
