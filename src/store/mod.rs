//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 持久化存储模块
//!
//! 数据库是用户记录的唯一数据源，缓存只保存其派生副本。

use crate::error::Result;
use crate::model::User;
use async_trait::async_trait;

pub mod sql;

pub use sql::SqlUserStore;

/// 数据库类型枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseType {
    PostgreSQL,
    SQLite,
}

impl DatabaseType {
    /// 从URL字符串解析数据库类型
    ///
    /// 无法识别的前缀返回 None
    pub fn from_url(url: &str) -> Option<Self> {
        let lower = url.to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(DatabaseType::PostgreSQL)
        } else if lower.starts_with("sqlite:") {
            Some(DatabaseType::SQLite)
        } else {
            None
        }
    }
}

/// 用户存储特征
///
/// 每个写操作都要求数据库返回受影响的行；没有行受影响时返回 `None`。
/// email 唯一约束冲突必须以 `ServiceError::Conflict` 返回。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    /// 创建用户表（已存在时不做任何事）
    async fn create_table_if_absent(&self) -> Result<()>;

    /// 插入新用户
    async fn insert(&self, name: &str, email: &str) -> Result<User>;

    /// 按 id 升序返回全部用户
    async fn select_all(&self) -> Result<Vec<User>>;

    /// 按 id 查询用户
    async fn select_by_id(&self, id: i32) -> Result<Option<User>>;

    /// 更新用户
    async fn update(&self, id: i32, name: &str, email: &str) -> Result<Option<User>>;

    /// 删除用户并返回被删除的行
    async fn delete_by_id(&self, id: i32) -> Result<Option<User>>;

    /// 检查数据库连接
    async fn ping(&self) -> Result<()>;
}
