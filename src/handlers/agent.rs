//! Device-facing polling endpoints. Every response carries the controller
//! marker header so agents can tell they reached the right service.

use std::sync::Arc;

use axum::{
    Json, RequestExt,
    extract::{Form, Path, Query, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::build::ConfigBuilder;
use crate::models::{Device, RegisterFields};
use crate::status;
use crate::utils::normalize_mac;

use super::ErrorResponse;

pub const CONTROLLER_HEADER: &str = "X-Roost-Controller";
pub const ARCHIVE_SHA_HEADER: &str = "X-Roost-Archive-Sha256";

fn marked(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(CONTROLLER_HEADER, HeaderValue::from_static("true"));
    response
}

fn problem(status: StatusCode, message: impl Into<String>) -> Response {
    marked((status, Json(ErrorResponse::new(message))).into_response())
}

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub backend: String,
    #[serde(default)]
    pub mac_address: String,
    #[serde(default)]
    pub key: String,
}

/// POST /controller/register/
pub async fn register(
    State(state): State<Arc<AppState>>,
    Form(form): Form<RegisterForm>,
) -> Response {
    if form.secret.is_empty() || form.secret != state.config.shared_secret {
        return problem(StatusCode::UNAUTHORIZED, "unrecognized secret");
    }

    let mac = normalize_mac(&form.mac_address);
    let key = if form.key.is_empty() {
        derive_key(&mac, &form.secret)
    } else {
        form.key.clone()
    };

    let fields = RegisterFields {
        name: form.name.clone(),
        backend: form.backend.clone(),
        mac,
    };
    let (device, is_new) = match state.store.register_device(&key, &fields).await {
        Ok(v) => v,
        Err(e) => return problem(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    tracing::info!(uuid = %device.uuid, is_new, "device registered");
    let body = format!(
        "uuid: {}\nkey: {}\nhostname: {}\nis-new: {}\n",
        device.uuid,
        key,
        device.name,
        if is_new { 1 } else { 0 }
    );
    marked(
        (
            StatusCode::CREATED,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            body,
        )
            .into_response(),
    )
}

/// Registration keys default to md5(mac + secret), matching what agents
/// compute on their side.
pub fn derive_key(mac: &str, secret: &str) -> String {
    let digest = Md5::digest(format!("{}{}", mac, secret).as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[derive(Debug, Deserialize)]
pub struct KeyQuery {
    #[serde(default)]
    pub key: String,
}

async fn auth_device(state: &AppState, uuid: &str, key: &str) -> Result<Device, Response> {
    let device = match state.store.get_device(uuid).await {
        Ok(Some(d)) => d,
        Ok(None) => return Err(problem(StatusCode::NOT_FOUND, "device not found")),
        Err(e) => return Err(problem(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    };
    if key.is_empty() || key != device.device_key {
        return Err(problem(StatusCode::FORBIDDEN, "invalid key"));
    }
    Ok(device)
}

async fn build_archive(state: &AppState, device: &Device) -> Result<(Vec<u8>, String), Response> {
    let builder = ConfigBuilder::new(state.store.clone());
    builder.build_archive(device).await.map_err(|e| {
        tracing::warn!(uuid = %device.uuid, "config build failed: {:#}", e);
        problem(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
    })
}

/// GET /controller/checksum/:uuid/?key=...
pub async fn checksum(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
    Query(q): Query<KeyQuery>,
) -> Response {
    let device = match auth_device(&state, &uuid, &q.key).await {
        Ok(d) => d,
        Err(r) => return r,
    };
    let (_, sha) = match build_archive(&state, &device).await {
        Ok(v) => v,
        Err(r) => return r,
    };
    if let Err(e) = state.store.touch_device_seen(&device.uuid).await {
        tracing::warn!(uuid = %device.uuid, "touch last_seen failed: {}", e);
    }
    marked(
        (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("{}\n", sha),
        )
            .into_response(),
    )
}

/// GET /controller/download-config/:uuid/?key=...
pub async fn download_config(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
    Query(q): Query<KeyQuery>,
    headers: HeaderMap,
) -> Response {
    let device = match auth_device(&state, &uuid, &q.key).await {
        Ok(d) => d,
        Err(r) => return r,
    };
    let (bytes, sha) = match build_archive(&state, &device).await {
        Ok(v) => v,
        Err(r) => return r,
    };
    let etag = format!("\"{}\"", sha);

    let mut response = if headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == etag)
        .unwrap_or(false)
    {
        StatusCode::NOT_MODIFIED.into_response()
    } else {
        if let Err(e) = state.store.update_device_config_sha(&device.uuid, &sha).await {
            tracing::warn!(uuid = %device.uuid, "record served sha failed: {}", e);
        }
        (
            [
                (header::CONTENT_TYPE, "application/gzip"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=configuration.tar.gz",
                ),
            ],
            bytes,
        )
            .into_response()
    };

    let h = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&etag) {
        h.insert(header::ETAG, v);
    }
    if let Ok(v) = HeaderValue::from_str(&sha) {
        h.insert(ARCHIVE_SHA_HEADER, v);
    }
    h.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("private, max-age=0, must-revalidate"),
    );
    marked(response)
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusReport {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub config_sha: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub log: String,
}

/// POST /controller/report-status/:uuid/ — accepts form or JSON bodies.
pub async fn report_status(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
    request: Request,
) -> Response {
    let is_json = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false);

    let report: StatusReport = if is_json {
        match request.extract::<Json<StatusReport>, _>().await {
            Ok(Json(r)) => r,
            Err(e) => return problem(StatusCode::BAD_REQUEST, e.to_string()),
        }
    } else {
        match request.extract::<Form<StatusReport>, _>().await {
            Ok(Form(r)) => r,
            Err(e) => return problem(StatusCode::BAD_REQUEST, e.to_string()),
        }
    };

    let device = match auth_device(&state, &uuid, &report.key).await {
        Ok(d) => d,
        Err(r) => return r,
    };
    if report.status.trim().is_empty() {
        return problem(StatusCode::BAD_REQUEST, "status required");
    }

    let normalized = status::normalize(&report.status);
    let error = if !report.log.is_empty() {
        report.log.clone()
    } else {
        report.error.clone()
    };

    if let Err(e) = state
        .store
        .record_device_status(&device.uuid, normalized, &report.config_sha, &error)
        .await
    {
        return problem(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    tracing::debug!(uuid = %device.uuid, status = normalized, "status reported");
    marked(
        (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "ok\n".to_string(),
        )
            .into_response(),
    )
}

#[derive(Serialize)]
struct DebugFile {
    path: String,
    size: usize,
    preview: String,
}

#[derive(Serialize)]
struct DebugConfig {
    sha256: String,
    files: Vec<DebugFile>,
}

/// GET /controller/debug-config/:uuid/?key=... — operator debugging aid.
pub async fn debug_config(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
    Query(q): Query<KeyQuery>,
) -> Response {
    let device = match auth_device(&state, &uuid, &q.key).await {
        Ok(d) => d,
        Err(r) => return r,
    };

    let builder = ConfigBuilder::new(state.store.clone());
    let files = match builder.build_files(&device).await {
        Ok(f) => f,
        Err(e) => return problem(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
    };
    let (_, sha) = match crate::build::archive::build(&files) {
        Ok(v) => v,
        Err(e) => return problem(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let files = files
        .into_iter()
        .map(|(path, body)| {
            let preview = if body.chars().count() > 300 {
                let head: String = body.chars().take(300).collect();
                format!("{}...(truncated)", head)
            } else {
                body.clone()
            };
            DebugFile {
                path,
                size: body.len(),
                preview,
            }
        })
        .collect();

    marked(Json(DebugConfig { sha256: sha, files }).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_derivation_matches_agent_side() {
        // md5("00:11:22:33:44:55" + "s3cret")
        let key = derive_key("00:11:22:33:44:55", "s3cret");
        assert_eq!(key.len(), 32);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(key, derive_key("00:11:22:33:44:55", "s3cret"));
        assert_ne!(key, derive_key("00:11:22:33:44:66", "s3cret"));
    }
}
