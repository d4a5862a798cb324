//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 服务错误到 HTTP 响应的映射。

use crate::error::ServiceError;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{debug, error};

/// HTTP 层错误包装
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        ApiError(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!("Rejected request body: {}", rejection.body_text());
        ApiError(ServiceError::Validation(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        debug!("Rejected path: {}", rejection.body_text());
        ApiError(ServiceError::Validation(rejection.body_text()))
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self.0 {
            ServiceError::NotFound(_) => json!({ "message": "User not found" }),
            ServiceError::Conflict(_) => json!({ "message": "Email already registered" }),
            ServiceError::Validation(msg) => json!({ "message": msg }),
            other => {
                error!("Request failed: {}", other);
                json!({ "error": other.to_string() })
            }
        };
        (status, Json(body)).into_response()
    }
}
