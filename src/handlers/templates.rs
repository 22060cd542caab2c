use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::AppState;
use crate::models::{CreateTemplateRequest, Template, template_kind};

use super::{ApiError, created, ok_status};

fn validate(req: &CreateTemplateRequest) -> Result<(), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("name required"));
    }
    match req.kind.trim().to_lowercase().as_str() {
        "" | template_kind::GO | template_kind::NETJSON => Ok(()),
        other => Err(ApiError::bad_request(format!(
            "unknown template kind: {}",
            other
        ))),
    }
}

pub async fn list_templates(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Template>>, ApiError> {
    let templates = state.store.list_templates().await?;
    Ok(Json(templates))
}

pub async fn get_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Template>, ApiError> {
    let template = state
        .store
        .get_template(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Template"))?;
    Ok(Json(template))
}

pub async fn create_template(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTemplateRequest>,
) -> Result<(StatusCode, Json<Template>), ApiError> {
    validate(&req)?;
    let template = state.store.create_template(&req).await.map_err(|e| {
        if e.to_string().contains("UNIQUE") {
            ApiError::conflict(format!("template name already in use: {}", req.name))
        } else {
            ApiError::from(e)
        }
    })?;
    Ok(created(template))
}

pub async fn update_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<CreateTemplateRequest>,
) -> Result<Json<Template>, ApiError> {
    validate(&req)?;
    let template = state
        .store
        .update_template(id, &req)
        .await?
        .ok_or_else(|| ApiError::not_found("Template"))?;
    Ok(Json(template))
}

pub async fn delete_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.store.delete_template(id).await? {
        return Err(ApiError::not_found("Template"));
    }
    Ok(ok_status())
}
