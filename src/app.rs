//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块负责组装服务：连接数据库、构建缓存后端与监督任务、创建协调器，以及有序关闭。

use crate::backend::{CacheBackend, MemoryBackend, RedisBackend};
use crate::config::{CacheMode, Config};
use crate::coordinator::Coordinator;
use crate::error::Result;
use crate::http;
use crate::metrics::Metrics;
use crate::store::{SqlUserStore, UserStore};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// 应用上下文
///
/// 所有长生命周期的句柄都在这里创建一次，再显式传递给处理器。
pub struct AppContext {
    config: Config,
    store: SqlUserStore,
    coordinator: Coordinator,
    cancel: CancellationToken,
    supervisor: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("store", &self.store)
            .field("coordinator", &self.coordinator)
            .field("supervised", &self.supervisor.is_some())
            .finish()
    }
}

impl AppContext {
    /// 初始化应用上下文
    ///
    /// 数据库连接失败会返回错误；建表失败与 Redis 不可达只记录日志，服务照常启动。
    #[instrument(skip(config), level = "info", name = "init_app")]
    pub async fn init(config: Config) -> Result<Self> {
        config.validate()?;

        let store = SqlUserStore::connect(&config.database).await?;
        if let Err(e) = store.create_table_if_absent().await {
            error!("Failed to initialize users table: {}", e);
        }

        let cancel = CancellationToken::new();
        let mut supervisor = None;
        let cache: Arc<dyn CacheBackend> = match config.cache.mode {
            CacheMode::Redis => {
                let backend = Arc::new(RedisBackend::connect(&config.cache).await?);
                supervisor = Some(backend.supervisor(&config.cache).spawn(cancel.clone()));
                backend
            }
            CacheMode::Memory => Arc::new(MemoryBackend::new(config.cache.max_capacity)),
        };
        info!("Cache backend: {} ({})", cache.name(), cache.state());

        let coordinator = Coordinator::new(
            Arc::new(store.clone()),
            cache,
            &config.cache,
            Arc::new(Metrics::new()),
        );

        Ok(Self {
            config,
            store,
            coordinator,
            cancel,
            supervisor,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// 构建 HTTP 路由
    pub fn router(&self) -> axum::Router {
        http::router(self.coordinator.clone())
    }

    /// 停止监督任务并关闭连接池
    #[instrument(skip(self), level = "info")]
    pub async fn shutdown(mut self) -> Result<()> {
        self.cancel.cancel();
        if let Some(handle) = self.supervisor.take() {
            if let Err(e) = handle.await {
                warn!("Supervisor task ended abnormally: {}", e);
            }
        }
        // 协调器持有连接池的克隆，先释放它
        drop(self.coordinator);
        self.store.close().await?;
        info!("Shutdown complete");
        Ok(())
    }
}

/// 启动 HTTP 服务，收到 Ctrl-C 后优雅关闭
pub async fn serve(ctx: AppContext) -> anyhow::Result<()> {
    let addr = format!("{}:{}", ctx.config.server.host, ctx.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, ctx.router())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    ctx.shutdown().await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
