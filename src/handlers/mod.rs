pub mod agent;
pub mod devices;
pub mod groups;
pub mod ipam;
pub mod templates;
pub mod variables;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::build::renderer::RenderError;
use crate::build::varschema::SchemaError;
use crate::db::{IpamError, NotFoundError};

/// Error response - matches the agent-facing {"error": "message"} format
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// API error type
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn not_found(resource: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: format!("{} not found", resource),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: msg.into(),
        }
    }

    pub fn unprocessable(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse::new(self.message))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        // Typed errors first (no fragile string matching)
        if let Some(nf) = err.downcast_ref::<NotFoundError>() {
            return Self {
                status: StatusCode::NOT_FOUND,
                message: nf.to_string(),
            };
        }
        if let Some(se) = err.downcast_ref::<SchemaError>() {
            return match se {
                SchemaError::UnknownVariable(_) => Self::bad_request(se.to_string()),
                SchemaError::Invalid { .. } | SchemaError::MissingRequired(_) => {
                    Self::unprocessable(se.to_string())
                }
            };
        }
        if let Some(re) = err.downcast_ref::<RenderError>() {
            return Self::unprocessable(re.to_string());
        }
        if let Some(ie) = err.downcast_ref::<IpamError>() {
            return match ie {
                IpamError::InvalidPrefixLength { .. } | IpamError::UnsupportedFamily { .. } => {
                    Self::bad_request(ie.to_string())
                }
                IpamError::Exhausted { .. } | IpamError::NoFreeAddress { .. } => {
                    Self::conflict(ie.to_string())
                }
            };
        }
        tracing::error!("internal error: {:#}", err);
        Self::internal(err.to_string())
    }
}

/// 201 Created with a JSON body
pub fn created<T: Serialize>(body: T) -> (StatusCode, Json<T>) {
    (StatusCode::CREATED, Json(body))
}

/// Standard {"status": "ok"} body for mutations with nothing to return
pub fn ok_status() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}
