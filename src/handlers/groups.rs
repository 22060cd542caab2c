use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::AppState;
use crate::build::varschema;
use crate::models::{
    AssignTemplateRequest, CreateGroupRequest, Device, Group, GroupVariable, SetVariableRequest,
    TemplateAssignment,
};

use super::{ApiError, created, ok_status};

async fn require_group(state: &AppState, id: i64) -> Result<Group, ApiError> {
    state
        .store
        .get_group(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Group"))
}

pub async fn list_groups(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Group>>, ApiError> {
    let groups = state.store.list_groups().await?;
    Ok(Json(groups))
}

pub async fn get_group(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Group>, ApiError> {
    let group = require_group(&state, id).await?;
    Ok(Json(group))
}

pub async fn create_group(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<Group>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("name required"));
    }
    let group = state.store.create_group(&req).await.map_err(|e| {
        if e.to_string().contains("UNIQUE") {
            ApiError::conflict(format!("group name already in use: {}", req.name))
        } else {
            ApiError::from(e)
        }
    })?;
    Ok(created(group))
}

pub async fn update_group(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<Json<Group>, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("name required"));
    }
    let group = state
        .store
        .update_group(id, &req)
        .await?
        .ok_or_else(|| ApiError::not_found("Group"))?;
    Ok(Json(group))
}

pub async fn delete_group(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.store.delete_group(id).await? {
        return Err(ApiError::not_found("Group"));
    }
    Ok(ok_status())
}

// ========== Membership ==========

pub async fn list_members(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Device>>, ApiError> {
    require_group(&state, id).await?;
    let members = state.store.group_members(id).await?;
    Ok(Json(members))
}

pub async fn add_member(
    State(state): State<Arc<AppState>>,
    Path((id, uuid)): Path<(i64, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_group(&state, id).await?;
    state
        .store
        .get_device(&uuid)
        .await?
        .ok_or_else(|| ApiError::not_found("Device"))?;
    state.store.add_group_member(id, &uuid).await?;
    Ok(ok_status())
}

pub async fn remove_member(
    State(state): State<Arc<AppState>>,
    Path((id, uuid)): Path<(i64, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_group(&state, id).await?;
    state.store.remove_group_member(id, &uuid).await?;
    Ok(ok_status())
}

// ========== Group variables ==========

pub async fn list_variables(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<GroupVariable>>, ApiError> {
    require_group(&state, id).await?;
    let vars = state.store.list_group_variables(id).await?;
    Ok(Json(vars))
}

pub async fn set_variable(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<SetVariableRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_group(&state, id).await?;
    let key = req.key.trim();
    if key.is_empty() {
        return Err(ApiError::bad_request("key required"));
    }
    let value = varschema::validate_one(key, &req.value).map_err(anyhow::Error::from)?;
    state.store.set_group_variable(id, key, &value).await?;
    Ok(ok_status())
}

pub async fn delete_variable(
    State(state): State<Arc<AppState>>,
    Path((id, key)): Path<(i64, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_group(&state, id).await?;
    if !state.store.delete_group_variable(id, &key).await? {
        return Err(ApiError::not_found("Variable"));
    }
    Ok(ok_status())
}

// ========== Group template assignments ==========

pub async fn list_assignments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<TemplateAssignment>>, ApiError> {
    require_group(&state, id).await?;
    let assignments = state.store.group_template_assignments(id).await?;
    Ok(Json(assignments))
}

pub async fn assign_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<AssignTemplateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_group(&state, id).await?;
    state
        .store
        .get_template(req.template_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Template"))?;
    state
        .store
        .assign_template_to_group(id, req.template_id, req.enabled, req.sort_order)
        .await?;
    Ok(ok_status())
}

pub async fn unassign_template(
    State(state): State<Arc<AppState>>,
    Path((id, template_id)): Path<(i64, i64)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_group(&state, id).await?;
    state
        .store
        .unassign_template_from_group(id, template_id)
        .await?;
    Ok(ok_status())
}
