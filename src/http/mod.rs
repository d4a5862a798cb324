//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! HTTP 接口模块

pub mod error;
pub mod extract;
pub mod handlers;

use crate::coordinator::Coordinator;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// 构建路由
pub fn router(coordinator: Coordinator) -> Router {
    Router::new()
        .route(
            "/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route(
            "/users/{id}",
            get(handlers::get_user)
                .put(handlers::update_user)
                .delete(handlers::delete_user),
        )
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(coordinator)
}
