use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::AppState;
use crate::models::{
    AllocateChildRequest, AssignAddressRequest, AssignPrefixRequest, CreatePrefixRequest,
    DeviceAddress, Prefix,
};

use super::{ApiError, created, ok_status};

pub async fn list_prefixes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Prefix>>, ApiError> {
    let prefixes = state.store.list_prefixes().await?;
    Ok(Json(prefixes))
}

pub async fn get_prefix(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Prefix>, ApiError> {
    let prefix = state
        .store
        .get_prefix(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Prefix"))?;
    Ok(Json(prefix))
}

pub async fn list_children(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Prefix>>, ApiError> {
    state
        .store
        .get_prefix(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Prefix"))?;
    let children = state.store.prefix_children(id).await?;
    Ok(Json(children))
}

pub async fn create_prefix(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePrefixRequest>,
) -> Result<(StatusCode, Json<Prefix>), ApiError> {
    let prefix = state
        .store
        .create_root_prefix(&req.cidr, &req.note)
        .await
        .map_err(|e| {
            if e.to_string().contains("UNIQUE") {
                ApiError::conflict(format!("prefix already exists: {}", req.cidr))
            } else {
                ApiError::from(e)
            }
        })?;
    Ok(created(prefix))
}

pub async fn allocate_child(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<AllocateChildRequest>,
) -> Result<(StatusCode, Json<Prefix>), ApiError> {
    let child = state
        .store
        .allocate_child_prefix(id, req.prefix_length, &req.note)
        .await?;
    Ok(created(child))
}

pub async fn delete_prefix(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.store.delete_prefix(id).await? {
        return Err(ApiError::not_found("Prefix"));
    }
    Ok(ok_status())
}

/// Allocate a child out of a parent prefix and bind it to a group in one
/// step. A group can hold at most one prefix; rebinding is refused.
pub async fn assign_prefix_to_group(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<AssignPrefixRequest>,
) -> Result<(StatusCode, Json<Prefix>), ApiError> {
    state
        .store
        .get_group(req.group_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Group"))?;
    if state.store.group_prefix(req.group_id).await?.is_some() {
        return Err(ApiError::conflict("group already has a prefix bound"));
    }

    let child = state
        .store
        .allocate_child_prefix(id, req.prefix_length, &req.note)
        .await?;
    state
        .store
        .assign_prefix_to_group(req.group_id, child.id)
        .await?;
    Ok(created(child))
}

pub async fn group_prefix(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<i64>,
) -> Result<Json<Prefix>, ApiError> {
    state
        .store
        .get_group(group_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Group"))?;
    let prefix = state
        .store
        .group_prefix(group_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Prefix"))?;
    Ok(Json(prefix))
}

/// Lease an address for a device from its group's bound prefix.
pub async fn assign_address(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AssignAddressRequest>,
) -> Result<(StatusCode, Json<DeviceAddress>), ApiError> {
    state
        .store
        .get_device(&req.device_uuid)
        .await?
        .ok_or_else(|| ApiError::not_found("Device"))?;
    let prefix = state
        .store
        .group_prefix(req.group_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Prefix"))?;
    let lease = state
        .store
        .assign_address(prefix.id, &req.device_uuid)
        .await?;
    Ok(created(lease))
}

pub async fn device_addresses(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
) -> Result<Json<Vec<DeviceAddress>>, ApiError> {
    state
        .store
        .get_device(&uuid)
        .await?
        .ok_or_else(|| ApiError::not_found("Device"))?;
    let addresses = state.store.device_addresses(&uuid).await?;
    Ok(Json(addresses))
}

pub async fn prefix_addresses(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<DeviceAddress>>, ApiError> {
    state
        .store
        .get_prefix(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Prefix"))?;
    let addresses = state.store.prefix_addresses(id).await?;
    Ok(Json(addresses))
}

pub async fn release_address(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.store.release_address(id).await? {
        return Err(ApiError::not_found("Address"));
    }
    Ok(ok_status())
}
