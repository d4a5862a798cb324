//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 请求提取器：包装 axum 的 `Json` 与 `Path`，把提取失败转成统一的 400 响应。

use super::error::ApiError;
use axum::extract::{FromRequest, FromRequestParts};

/// JSON 请求体；解析失败、缺少或错误的 Content-Type 都返回 400
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// 路径参数；无法解析为目标类型时返回 400
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);
