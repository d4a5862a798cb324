//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存连接的监督任务：心跳检测、断线重连与可观察的连接状态。

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// 连接正常
    Connected,
    /// 正在重连，`attempt` 为已失败的重连次数
    Reconnecting { attempt: u32 },
    /// 连续重连失败次数超过上限；监督任务仍按退避上限继续尝试
    Failed { attempts: u32 },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// 指标用的状态码（0: 失败, 1: 正常, 2: 重连中）
    pub fn status_code(&self) -> u8 {
        match self {
            ConnectionState::Connected => 1,
            ConnectionState::Reconnecting { .. } => 2,
            ConnectionState::Failed { .. } => 0,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting { attempt } => {
                write!(f, "reconnecting (attempt {})", attempt)
            }
            ConnectionState::Failed { attempts } => {
                write!(f, "failed ({} attempts)", attempts)
            }
        }
    }
}

/// 连接状态句柄
///
/// 后端与监督任务共享同一个句柄：后端在命令失败时上报断线并唤醒监督任务，
/// 监督任务负责状态迁移，其他组件只读。
#[derive(Clone, Debug)]
pub struct StateHandle {
    tx: Arc<watch::Sender<ConnectionState>>,
    wake: Arc<Notify>,
}

impl StateHandle {
    pub fn new(initial: ConnectionState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            tx: Arc::new(tx),
            wake: Arc::new(Notify::new()),
        }
    }

    /// 当前状态
    pub fn get(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    /// 订阅状态变化
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    fn set(&self, state: ConnectionState) -> ConnectionState {
        self.tx.send_replace(state)
    }

    /// 首次连接成功后由后端调用
    pub(crate) fn set_connected(&self) {
        self.set(ConnectionState::Connected);
    }

    /// 上报连接丢失
    ///
    /// 只有处于 Connected 时才会迁移到 Reconnecting，重复上报不会重置重试计数。
    pub fn report_lost(&self) {
        let changed = self.tx.send_if_modified(|state| {
            if state.is_connected() {
                *state = ConnectionState::Reconnecting { attempt: 0 };
                true
            } else {
                false
            }
        });
        if changed {
            warn!("Cache connection lost, waking supervisor");
            self.wake.notify_one();
        }
    }
}

/// 指数退避策略
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    initial_ms: u64,
    max_ms: u64,
}

impl Backoff {
    pub fn new(initial_ms: u64, max_ms: u64) -> Self {
        Self {
            initial_ms: initial_ms.max(1),
            max_ms: max_ms.max(initial_ms.max(1)),
        }
    }

    /// 第 `attempt` 次失败后的等待时间：`min(initial * 2^attempt, max)`
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.initial_ms.saturating_mul(factor).min(self.max_ms))
    }
}

/// 可被监督的连接
#[async_trait]
pub trait Reconnectable: Send + Sync + 'static {
    /// 检查当前连接（例如 PING）
    async fn probe(&self) -> Result<()>;

    /// 建立一条新连接并替换旧连接
    async fn reconnect(&self) -> Result<()>;
}

/// 监督任务配置
#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    /// 心跳间隔
    pub check_interval: Duration,
    /// 单次探测/重连的超时
    pub attempt_timeout: Duration,
    /// 退避策略
    pub backoff: Backoff,
    /// 连续失败多少次后进入 Failed，0 表示不限
    pub max_attempts: u32,
}

/// 连接监督者
///
/// 独立于请求处理运行：定期心跳，断线后按指数退避重连。
pub struct ConnectionSupervisor<T: Reconnectable> {
    target: Arc<T>,
    state: StateHandle,
    config: SupervisorConfig,
    name: String,
}

impl<T: Reconnectable> ConnectionSupervisor<T> {
    pub fn new(
        name: impl Into<String>,
        target: Arc<T>,
        state: StateHandle,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            target,
            state,
            config,
            name: name.into(),
        }
    }

    /// 在后台启动监督任务，取消令牌触发后退出
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    /// 监督循环
    pub async fn run(self, cancel: CancellationToken) {
        info!("{} supervisor started, state={}", self.name, self.state.get());
        loop {
            match self.state.get() {
                ConnectionState::Connected => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.config.check_interval) => {}
                        _ = self.state.wake.notified() => {}
                    }
                    if self.state.get().is_connected() {
                        self.heartbeat().await;
                    }
                }
                ConnectionState::Reconnecting { attempt }
                | ConnectionState::Failed { attempts: attempt } => {
                    if self.try_reconnect(attempt).await {
                        continue;
                    }
                    let delay = self.config.backoff.delay(attempt);
                    debug!("{} next reconnect in {:?}", self.name, delay);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
        info!("{} supervisor stopped", self.name);
    }

    async fn heartbeat(&self) {
        match timeout(self.config.attempt_timeout, self.target.probe()).await {
            Ok(Ok(())) => {
                tracing::trace!("{} heartbeat ok", self.name);
            }
            Ok(Err(e)) => {
                warn!("{} heartbeat failed: {}", self.name, e);
                self.transition(ConnectionState::Reconnecting { attempt: 0 });
            }
            Err(_) => {
                warn!(
                    "{} heartbeat timed out after {:?}",
                    self.name, self.config.attempt_timeout
                );
                self.transition(ConnectionState::Reconnecting { attempt: 0 });
            }
        }
    }

    /// 尝试一次重连，成功返回 true
    async fn try_reconnect(&self, attempt: u32) -> bool {
        let outcome = match timeout(self.config.attempt_timeout, self.target.reconnect()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timed out after {:?}", self.config.attempt_timeout)),
        };

        match outcome {
            Ok(()) => {
                info!("{} reconnected after {} failed attempts", self.name, attempt);
                self.transition(ConnectionState::Connected);
                true
            }
            Err(reason) => {
                let failed = attempt.saturating_add(1);
                let next = if self.config.max_attempts > 0 && failed >= self.config.max_attempts {
                    ConnectionState::Failed { attempts: failed }
                } else {
                    ConnectionState::Reconnecting { attempt: failed }
                };
                if matches!(next, ConnectionState::Failed { .. }) {
                    error!("{} reconnect attempt {} failed: {}", self.name, failed, reason);
                } else {
                    warn!("{} reconnect attempt {} failed: {}", self.name, failed, reason);
                }
                self.transition(next);
                false
            }
        }
    }

    fn transition(&self, next: ConnectionState) {
        let previous = self.state.set(next);
        if previous != next {
            let kind_changed = std::mem::discriminant(&previous) != std::mem::discriminant(&next);
            if kind_changed {
                info!("{} connection state: {} -> {}", self.name, previous, next);
            } else {
                debug!("{} connection state: {} -> {}", self.name, previous, next);
            }
        }
    }
}
