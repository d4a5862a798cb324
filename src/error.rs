//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了用户服务的错误类型和处理机制。

use thiserror::Error;

/// 用户服务错误类型枚举
///
/// `NotFound` 与 `Conflict` 是预期结果，会原样返回给调用方；
/// `StoreUnavailable` 表示数据源故障，对请求而言是硬错误；
/// `CacheDegraded` 只在缓存层内部出现，协调器会记录日志后吞掉。
#[derive(Error, Debug)]
pub enum ServiceError {
    /// 指定ID的用户不存在
    #[error("User {0} not found")]
    NotFound(i32),

    /// 唯一约束冲突（email 重复）
    #[error("Conflict: {0}")]
    Conflict(String),

    /// 数据库连接或查询失败
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// 缓存操作失败
    #[error("Cache degraded: {0}")]
    CacheDegraded(String),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 请求参数校验失败
    #[error("Validation error: {0}")]
    Validation(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO错误
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ServiceError {
    /// 是否为缓存层错误
    pub fn is_cache_error(&self) -> bool {
        matches!(self, ServiceError::CacheDegraded(_))
    }
}

impl From<redis::RedisError> for ServiceError {
    fn from(e: redis::RedisError) -> Self {
        ServiceError::CacheDegraded(e.to_string())
    }
}

impl From<sea_orm::DbErr> for ServiceError {
    fn from(e: sea_orm::DbErr) -> Self {
        match e.sql_err() {
            Some(sea_orm::SqlErr::UniqueConstraintViolation(detail)) => {
                ServiceError::Conflict(detail)
            }
            _ => ServiceError::StoreUnavailable(e.to_string()),
        }
    }
}

/// 服务操作结果类型别名
pub type Result<T> = std::result::Result<T, ServiceError>;
