//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于Redis的共享缓存后端。

use super::CacheBackend;
use crate::config::CacheConfig;
use crate::error::{Result, ServiceError};
use crate::recovery::{
    Backoff, ConnectionState, ConnectionSupervisor, Reconnectable, StateHandle, SupervisorConfig,
};
use crate::utils::redaction::redact_connection_string;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client, FromRedisValue, RedisError};
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

/// Redis缓存后端
///
/// 连接由 [`ConnectionSupervisor`] 维护。状态不是 Connected 时所有命令立即返回
/// `CacheDegraded`，不会阻塞请求；命令遇到连接类错误时上报断线。
#[derive(Clone)]
pub struct RedisBackend {
    client: Client,
    manager: Arc<RwLock<Option<ConnectionManager>>>,
    state: StateHandle,
    command_timeout: Duration,
    connection_timeout: Duration,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("state", &self.state.get())
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

impl RedisBackend {
    /// 创建Redis缓存后端并尝试首次连接
    ///
    /// 首次连接失败不会返回错误：后端以 Reconnecting 状态启动，由监督任务继续重连。
    /// 只有连接字符串无法解析时才返回 `Configuration` 错误。
    #[instrument(skip(config), level = "info", name = "init_redis_backend")]
    pub async fn connect(config: &CacheConfig) -> Result<Self> {
        let url = config.connection_string.expose_secret();
        let client = Client::open(url).map_err(|e| {
            ServiceError::Configuration(format!(
                "Invalid redis url {}: {}",
                redact_connection_string(url),
                e
            ))
        })?;

        let backend = Self {
            client,
            manager: Arc::new(RwLock::new(None)),
            state: StateHandle::new(ConnectionState::Reconnecting { attempt: 0 }),
            command_timeout: Duration::from_millis(config.command_timeout_ms),
            connection_timeout: Duration::from_millis(config.connection_timeout_ms),
        };

        match backend.open_manager().await {
            Ok(manager) => {
                *backend.manager.write().await = Some(manager);
                backend.state.set_connected();
                info!("Connected to redis at {}", redact_connection_string(url));
            }
            Err(e) => {
                warn!(
                    "Redis at {} unreachable, starting degraded: {}",
                    redact_connection_string(url),
                    e
                );
            }
        }

        Ok(backend)
    }

    /// 共享的连接状态句柄
    pub fn state_handle(&self) -> StateHandle {
        self.state.clone()
    }

    /// 构建该后端的连接监督者
    pub fn supervisor(self: &Arc<Self>, config: &CacheConfig) -> ConnectionSupervisor<Self> {
        let supervisor_config = SupervisorConfig {
            check_interval: Duration::from_secs(config.health_check_interval_secs),
            attempt_timeout: self.connection_timeout,
            backoff: Backoff::new(config.initial_backoff_ms, config.max_backoff_ms),
            max_attempts: config.max_reconnect_attempts,
        };
        ConnectionSupervisor::new("redis", Arc::clone(self), self.state.clone(), supervisor_config)
    }

    async fn open_manager(&self) -> Result<ConnectionManager> {
        match timeout(self.connection_timeout, self.client.get_connection_manager()).await {
            Ok(res) => Ok(res?),
            Err(_) => Err(ServiceError::CacheDegraded(format!(
                "Connection timed out after {}ms",
                self.connection_timeout.as_millis()
            ))),
        }
    }

    /// 取出当前连接；未连接时快速失败
    async fn connection(&self) -> Result<ConnectionManager> {
        let state = self.state.get();
        if !state.is_connected() {
            return Err(ServiceError::CacheDegraded(format!("redis is {}", state)));
        }
        self.manager
            .read()
            .await
            .clone()
            .ok_or_else(|| ServiceError::CacheDegraded("redis connection not initialized".into()))
    }

    /// 执行一条命令，带超时；连接类错误会上报断线
    async fn run<T: FromRedisValue>(&self, cmd: redis::Cmd) -> Result<T> {
        let mut conn = self.connection().await?;
        match timeout(self.command_timeout, cmd.query_async::<T>(&mut conn)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                if is_connection_error(&e) {
                    self.state.report_lost();
                }
                Err(e.into())
            }
            Err(_) => {
                self.state.report_lost();
                Err(ServiceError::CacheDegraded(format!(
                    "Command timed out after {}ms",
                    self.command_timeout.as_millis()
                )))
            }
        }
    }
}

fn is_connection_error(e: &RedisError) -> bool {
    e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
}

#[async_trait]
impl CacheBackend for RedisBackend {
    #[instrument(skip(self), level = "debug")]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        let value: Option<Vec<u8>> = self.run(cmd).await?;
        debug!("redis get: key={}, hit={}", key, value.is_some());
        Ok(value)
    }

    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if ttl_secs > 0 {
            cmd.arg("EX").arg(ttl_secs);
        }
        self.run::<()>(cmd).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, key: &str) -> Result<()> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        let removed: i64 = self.run(cmd).await?;
        debug!("redis del: key={}, removed={}", key, removed);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.run::<String>(redis::cmd("PING")).await.map(|_| ())
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[async_trait]
impl Reconnectable for RedisBackend {
    async fn probe(&self) -> Result<()> {
        let mut conn = self
            .manager
            .read()
            .await
            .clone()
            .ok_or_else(|| ServiceError::CacheDegraded("redis connection not initialized".into()))?;
        let pong = redis::cmd("PING").query_async::<String>(&mut conn).await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(ServiceError::CacheDegraded(format!("Unexpected PING reply: {}", pong)))
        }
    }

    async fn reconnect(&self) -> Result<()> {
        let mut manager = self.open_manager().await?;
        redis::cmd("PING").query_async::<String>(&mut manager).await?;
        *self.manager.write().await = Some(manager);
        Ok(())
    }
}
