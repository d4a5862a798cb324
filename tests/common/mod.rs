//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了测试的通用工具函数和设置。

#![allow(dead_code)]

use async_trait::async_trait;
use secrecy::SecretString;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;
use usercache::backend::{CacheBackend, MemoryBackend};
use usercache::config::{CacheConfig, CacheMode, Config, DatabaseConfig};
use usercache::error::Result;
use usercache::metrics::Metrics;
use usercache::model::User;
use usercache::store::{SqlUserStore, UserStore};
use usercache::Coordinator;

static INIT: Once = Once::new();

pub fn setup_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_span_events(FmtSpan::CLOSE)
            .with_env_filter(EnvFilter::new("debug"))
            .try_init()
            .ok();
    });
}

/// 内存 SQLite 的数据库配置
///
/// 每条连接都有独立的内存库，所以连接池固定为一条连接。
pub fn sqlite_memory_config() -> DatabaseConfig {
    DatabaseConfig {
        url: SecretString::new("sqlite::memory:".into()),
        max_connections: 1,
        min_connections: 1,
        ..Default::default()
    }
}

/// 使用内存 SQLite 与进程内缓存的完整配置
pub fn memory_config() -> Config {
    Config {
        database: sqlite_memory_config(),
        cache: CacheConfig {
            mode: CacheMode::Memory,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// 创建已建表的内存 SQLite 存储
pub async fn sqlite_store() -> SqlUserStore {
    let store = SqlUserStore::connect(&sqlite_memory_config())
        .await
        .expect("Failed to open in-memory sqlite");
    store
        .create_table_if_absent()
        .await
        .expect("Failed to create users table");
    store
}

/// 用给定的存储和缓存组装协调器
pub fn coordinator_with(
    store: Arc<dyn UserStore>,
    cache: Arc<dyn CacheBackend>,
    single_flight: bool,
) -> Coordinator {
    let config = CacheConfig {
        single_flight,
        ..Default::default()
    };
    Coordinator::new(store, cache, &config, Arc::new(Metrics::new()))
}

/// 内存 SQLite + Moka 缓存的协调器，同时返回缓存句柄便于断言
pub async fn memory_coordinator() -> (Coordinator, Arc<MemoryBackend>) {
    setup_logging();
    let cache = Arc::new(MemoryBackend::new(64));
    let coordinator = coordinator_with(Arc::new(sqlite_store().await), cache.clone(), true);
    (coordinator, cache)
}

/// 统计回源次数的存储包装
pub struct CountingStore<S> {
    inner: S,
    select_all_calls: AtomicUsize,
    delay: Duration,
}

impl<S: UserStore> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self::with_delay(inner, Duration::ZERO)
    }

    /// `select_all` 每次额外等待 `delay`，用于放大并发窗口
    pub fn with_delay(inner: S, delay: Duration) -> Self {
        Self {
            inner,
            select_all_calls: AtomicUsize::new(0),
            delay,
        }
    }

    pub fn select_all_calls(&self) -> usize {
        self.select_all_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: UserStore> UserStore for CountingStore<S> {
    async fn create_table_if_absent(&self) -> Result<()> {
        self.inner.create_table_if_absent().await
    }

    async fn insert(&self, name: &str, email: &str) -> Result<User> {
        self.inner.insert(name, email).await
    }

    async fn select_all(&self) -> Result<Vec<User>> {
        self.select_all_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.select_all().await
    }

    async fn select_by_id(&self, id: i32) -> Result<Option<User>> {
        self.inner.select_by_id(id).await
    }

    async fn update(&self, id: i32, name: &str, email: &str) -> Result<Option<User>> {
        self.inner.update(id, name, email).await
    }

    async fn delete_by_id(&self, id: i32) -> Result<Option<User>> {
        self.inner.delete_by_id(id).await
    }

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }
}

/// Redis 地址，优先读取 REDIS_URL
pub fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

/// 检查Redis是否可用
///
/// 尝试连接并执行 PING，1 秒内没有回应视为不可用
pub async fn is_redis_available() -> bool {
    let client = match redis::Client::open(redis_url().as_str()) {
        Ok(c) => c,
        Err(_) => return false,
    };
    let probe = async {
        let mut conn = client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await
    };
    matches!(
        tokio::time::timeout(Duration::from_secs(1), probe).await,
        Ok(Ok(_))
    )
}
