use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};

use crate::AppState;
use crate::build::varschema;
use crate::models::{DeviceVariable, GlobalVariable, SetVariableRequest};

use super::{ApiError, ok_status};

fn validated(req: &SetVariableRequest) -> Result<(String, String), ApiError> {
    let key = req.key.trim().to_string();
    if key.is_empty() {
        return Err(ApiError::bad_request("key required"));
    }
    let value = varschema::validate_one(&key, &req.value).map_err(anyhow::Error::from)?;
    Ok((key, value))
}

// ========== Device variables ==========

pub async fn list_device_variables(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
) -> Result<Json<Vec<DeviceVariable>>, ApiError> {
    state
        .store
        .get_device(&uuid)
        .await?
        .ok_or_else(|| ApiError::not_found("Device"))?;
    let vars = state.store.list_device_variables(&uuid).await?;
    Ok(Json(vars))
}

pub async fn set_device_variable(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
    Json(req): Json<SetVariableRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .store
        .get_device(&uuid)
        .await?
        .ok_or_else(|| ApiError::not_found("Device"))?;
    let (key, value) = validated(&req)?;
    state.store.set_device_variable(&uuid, &key, &value).await?;
    Ok(ok_status())
}

pub async fn delete_device_variable(
    State(state): State<Arc<AppState>>,
    Path((uuid, key)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.store.delete_device_variable(&uuid, &key).await? {
        return Err(ApiError::not_found("Variable"));
    }
    Ok(ok_status())
}

// ========== Global variables ==========

pub async fn list_global_variables(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<GlobalVariable>>, ApiError> {
    let vars = state.store.list_global_variables().await?;
    Ok(Json(vars))
}

pub async fn set_global_variable(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SetVariableRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (key, value) = validated(&req)?;
    state.store.set_global_variable(&key, &value).await?;
    Ok(ok_status())
}

pub async fn delete_global_variable(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.store.delete_global_variable(&key).await? {
        return Err(ApiError::not_found("Variable"));
    }
    Ok(ok_status())
}
