//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 用户资源的请求处理器，只负责参数校验与响应转换。

use super::error::ApiError;
use super::extract::{ApiJson, ApiPath};
use crate::coordinator::{Coordinator, HealthReport};
use crate::error::ServiceError;
use crate::model::{User, UserInput};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

/// 创建/更新请求体；字段缺失与空串同样按校验失败处理
#[derive(Debug, Default, Deserialize)]
pub struct UserPayload {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl UserPayload {
    /// 校验 name 与 email 去除空白后非空
    pub fn validate(self) -> Result<UserInput, ServiceError> {
        let name = non_empty(self.name, "name")?;
        let email = non_empty(self.email, "email")?;
        Ok(UserInput { name, email })
    }
}

fn non_empty(value: Option<String>, field: &str) -> Result<String, ServiceError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ServiceError::Validation(format!("{} is required", field))),
    }
}

pub async fn list_users(State(coordinator): State<Coordinator>) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(coordinator.list_all().await?))
}

pub async fn get_user(
    State(coordinator): State<Coordinator>,
    ApiPath(id): ApiPath<i32>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(coordinator.get_by_id(id).await?))
}

pub async fn create_user(
    State(coordinator): State<Coordinator>,
    ApiJson(payload): ApiJson<UserPayload>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let input = payload.validate()?;
    let user = coordinator.create(input).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn update_user(
    State(coordinator): State<Coordinator>,
    ApiPath(id): ApiPath<i32>,
    ApiJson(payload): ApiJson<UserPayload>,
) -> Result<Json<User>, ApiError> {
    let input = payload.validate()?;
    Ok(Json(coordinator.update(id, input).await?))
}

pub async fn delete_user(
    State(coordinator): State<Coordinator>,
    ApiPath(id): ApiPath<i32>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(coordinator.delete(id).await?))
}

pub async fn health(State(coordinator): State<Coordinator>) -> (StatusCode, Json<HealthReport>) {
    let report = coordinator.health().await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

pub async fn metrics(State(coordinator): State<Coordinator>) -> impl IntoResponse {
    coordinator
        .metrics()
        .set_cache_health(coordinator.cache_state().status_code());
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        coordinator.metrics().render(),
    )
}
