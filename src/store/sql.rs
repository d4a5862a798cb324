//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 基于 SeaORM 的用户存储实现，支持 PostgreSQL 与 SQLite。

use super::{DatabaseType, UserStore};
use crate::config::DatabaseConfig;
use crate::error::{Result, ServiceError};
use crate::model::User;
use crate::utils::redaction::redact_connection_string;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, QueryResult,
    Statement, Value,
};
use secrecy::ExposeSecret;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// 各数据库方言下的SQL语句
struct Queries {
    create_table: &'static str,
    insert: &'static str,
    select_all: &'static str,
    select_by_id: &'static str,
    update: &'static str,
    delete_by_id: &'static str,
}

// 旧表的 TIMESTAMP 列按会话时区转换，与写入时 CURRENT_TIMESTAMP 的取值一致
const POSTGRES_QUERIES: Queries = Queries {
    create_table: "CREATE TABLE IF NOT EXISTS users (
        id SERIAL PRIMARY KEY,
        name VARCHAR(100) NOT NULL,
        email VARCHAR(100) UNIQUE NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
    )",
    insert: "INSERT INTO users (name, email) VALUES ($1, $2) \
             RETURNING id, name, email, created_at::timestamptz AS created_at",
    select_all: "SELECT id, name, email, created_at::timestamptz AS created_at \
                 FROM users ORDER BY id ASC",
    select_by_id: "SELECT id, name, email, created_at::timestamptz AS created_at \
                   FROM users WHERE id = $1",
    update: "UPDATE users SET name = $1, email = $2 WHERE id = $3 \
             RETURNING id, name, email, created_at::timestamptz AS created_at",
    delete_by_id: "DELETE FROM users WHERE id = $1 \
                   RETURNING id, name, email, created_at::timestamptz AS created_at",
};

const SQLITE_QUERIES: Queries = Queries {
    create_table: "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
    )",
    insert: "INSERT INTO users (name, email) VALUES (?, ?) \
             RETURNING id, name, email, created_at",
    select_all: "SELECT id, name, email, created_at FROM users ORDER BY id ASC",
    select_by_id: "SELECT id, name, email, created_at FROM users WHERE id = ?",
    update: "UPDATE users SET name = ?, email = ? WHERE id = ? \
             RETURNING id, name, email, created_at",
    delete_by_id: "DELETE FROM users WHERE id = ? RETURNING id, name, email, created_at",
};

/// SQL 用户存储
///
/// 持有 SeaORM 连接池；克隆开销很小，池本身在克隆间共享。
#[derive(Clone)]
pub struct SqlUserStore {
    db: DatabaseConnection,
    db_type: DatabaseType,
}

impl std::fmt::Debug for SqlUserStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlUserStore")
            .field("db_type", &self.db_type)
            .finish()
    }
}

impl SqlUserStore {
    /// 根据配置建立连接池
    #[instrument(skip(config), level = "info", name = "init_user_store")]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = config.url.expose_secret();
        let db_type = DatabaseType::from_url(url).ok_or_else(|| {
            ServiceError::Configuration(format!(
                "Unsupported database url: {}",
                redact_connection_string(url)
            ))
        })?;

        let mut opt = ConnectOptions::new(url.to_string());
        opt.max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .sqlx_logging(config.sql_logging);

        info!(
            "Connecting to {:?} at {}",
            db_type,
            redact_connection_string(url)
        );
        let db = Database::connect(opt)
            .await
            .map_err(|e| ServiceError::StoreUnavailable(e.to_string()))?;

        Ok(Self { db, db_type })
    }

    /// 数据库类型
    pub fn db_type(&self) -> DatabaseType {
        self.db_type
    }

    /// 关闭连接池
    pub async fn close(self) -> Result<()> {
        self.db.close().await?;
        Ok(())
    }

    fn backend(&self) -> DatabaseBackend {
        match self.db_type {
            DatabaseType::PostgreSQL => DatabaseBackend::Postgres,
            DatabaseType::SQLite => DatabaseBackend::Sqlite,
        }
    }

    fn queries(&self) -> &'static Queries {
        match self.db_type {
            DatabaseType::PostgreSQL => &POSTGRES_QUERIES,
            DatabaseType::SQLite => &SQLITE_QUERIES,
        }
    }

    fn statement<I>(&self, sql: &str, values: I) -> Statement
    where
        I: IntoIterator<Item = Value>,
    {
        Statement::from_sql_and_values(self.backend(), sql, values)
    }

    async fn fetch_one(&self, stmt: Statement) -> Result<Option<User>> {
        match self.db.query_one(stmt).await? {
            Some(row) => Ok(Some(self.row_to_user(&row)?)),
            None => Ok(None),
        }
    }

    /// 将查询结果行转换为用户记录
    ///
    /// PostgreSQL 返回带时区的时间戳；SQLite 的 CURRENT_TIMESTAMP 总是 UTC 文本。
    fn row_to_user(&self, row: &QueryResult) -> Result<User> {
        let created_at = match self.db_type {
            DatabaseType::PostgreSQL => row.try_get::<DateTime<Utc>>("", "created_at")?,
            DatabaseType::SQLite => row.try_get::<NaiveDateTime>("", "created_at")?.and_utc(),
        };
        Ok(User {
            id: row.try_get("", "id")?,
            name: row.try_get("", "name")?,
            email: row.try_get("", "email")?,
            created_at,
        })
    }
}

#[async_trait]
impl UserStore for SqlUserStore {
    #[instrument(skip(self), level = "info")]
    async fn create_table_if_absent(&self) -> Result<()> {
        self.db
            .execute(Statement::from_string(
                self.backend(),
                self.queries().create_table.to_string(),
            ))
            .await?;
        info!("Table users ready");
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn insert(&self, name: &str, email: &str) -> Result<User> {
        let stmt = self.statement(
            self.queries().insert,
            vec![Value::from(name), Value::from(email)],
        );
        self.fetch_one(stmt).await?.ok_or_else(|| {
            ServiceError::StoreUnavailable("INSERT did not return the created row".to_string())
        })
    }

    #[instrument(skip(self), level = "debug")]
    async fn select_all(&self) -> Result<Vec<User>> {
        let stmt = Statement::from_string(self.backend(), self.queries().select_all);
        let rows = self.db.query_all(stmt).await?;
        debug!("select_all returned {} rows", rows.len());
        rows.iter().map(|row| self.row_to_user(row)).collect()
    }

    #[instrument(skip(self), level = "debug")]
    async fn select_by_id(&self, id: i32) -> Result<Option<User>> {
        let stmt = self.statement(self.queries().select_by_id, vec![Value::from(id)]);
        self.fetch_one(stmt).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn update(&self, id: i32, name: &str, email: &str) -> Result<Option<User>> {
        let stmt = self.statement(
            self.queries().update,
            vec![Value::from(name), Value::from(email), Value::from(id)],
        );
        self.fetch_one(stmt).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete_by_id(&self, id: i32) -> Result<Option<User>> {
        let stmt = self.statement(self.queries().delete_by_id, vec![Value::from(id)]);
        self.fetch_one(stmt).await
    }

    async fn ping(&self) -> Result<()> {
        self.db.ping().await?;
        Ok(())
    }
}
