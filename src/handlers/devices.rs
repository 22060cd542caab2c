use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use crate::AppState;
use crate::build::resolver;
use crate::models::{
    AssignTemplateRequest, Device, DeviceStatusRecord, ReorderItem, ResolvedVariablesResponse,
    Template, TemplateAssignment,
};

use super::{ApiError, ok_status};

async fn require_device(state: &AppState, uuid: &str) -> Result<Device, ApiError> {
    state
        .store
        .get_device(uuid)
        .await?
        .ok_or_else(|| ApiError::not_found("Device"))
}

pub async fn list_devices(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Device>>, ApiError> {
    let devices = state.store.list_devices().await?;
    Ok(Json(devices))
}

pub async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
) -> Result<Json<Device>, ApiError> {
    let device = require_device(&state, &uuid).await?;
    Ok(Json(device))
}

pub async fn delete_device(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_device(&state, &uuid).await?;
    state.store.delete_device(&uuid).await?;
    Ok(ok_status())
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: i32,
}

fn default_history_limit() -> i32 {
    50
}

pub async fn status_history(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Vec<DeviceStatusRecord>>, ApiError> {
    require_device(&state, &uuid).await?;
    let limit = q.limit.clamp(1, 1000);
    let history = state.store.device_status_history(&uuid, limit).await?;
    Ok(Json(history))
}

/// The full variable resolution for a device, with per-layer provenance.
pub async fn resolved_variables(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
) -> Result<Json<ResolvedVariablesResponse>, ApiError> {
    let device = require_device(&state, &uuid).await?;
    let resolved = resolver::resolve_variables(&state.store, &device).await?;
    Ok(Json(ResolvedVariablesResponse {
        variables: resolved.vars,
        resolution_order: resolved.layers,
    }))
}

/// Templates in the order a build would apply them.
pub async fn resolved_templates(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
) -> Result<Json<Vec<Template>>, ApiError> {
    require_device(&state, &uuid).await?;
    let templates = resolver::resolve_templates(&state.store, &uuid).await?;
    Ok(Json(templates))
}

// ========== Template assignments ==========

pub async fn list_assignments(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
) -> Result<Json<Vec<TemplateAssignment>>, ApiError> {
    require_device(&state, &uuid).await?;
    let assignments = state.store.device_template_assignments(&uuid).await?;
    Ok(Json(assignments))
}

pub async fn assign_template(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
    Json(req): Json<AssignTemplateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_device(&state, &uuid).await?;
    state
        .store
        .get_template(req.template_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Template"))?;
    state
        .store
        .assign_template_to_device(&uuid, req.template_id, req.enabled, req.sort_order)
        .await?;
    Ok(ok_status())
}

pub async fn unassign_template(
    State(state): State<Arc<AppState>>,
    Path((uuid, template_id)): Path<(String, i64)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_device(&state, &uuid).await?;
    state
        .store
        .unassign_template_from_device(&uuid, template_id)
        .await?;
    Ok(ok_status())
}

pub async fn reorder_templates(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
    Json(items): Json<Vec<ReorderItem>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_device(&state, &uuid).await?;
    state.store.reorder_device_templates(&uuid, &items).await?;
    Ok(ok_status())
}

// ========== Template blocks ==========

pub async fn list_blocks(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
) -> Result<Json<Vec<i64>>, ApiError> {
    require_device(&state, &uuid).await?;
    let blocks = state.store.device_template_blocks(&uuid).await?;
    Ok(Json(blocks))
}

pub async fn block_template(
    State(state): State<Arc<AppState>>,
    Path((uuid, template_id)): Path<(String, i64)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_device(&state, &uuid).await?;
    state
        .store
        .block_template_for_device(&uuid, template_id)
        .await?;
    Ok(ok_status())
}

pub async fn unblock_template(
    State(state): State<Arc<AppState>>,
    Path((uuid, template_id)): Path<(String, i64)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_device(&state, &uuid).await?;
    state
        .store
        .unblock_template_for_device(&uuid, template_id)
        .await?;
    Ok(ok_status())
}
