//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块实现了数据库与缓存之间的 cache-aside 协调逻辑。
//!
//! 读取用户列表时先查缓存，未命中再回源数据库并回填；写操作先提交数据库，
//! 成功后删除列表缓存。缓存层的任何故障都只记录日志，不会让请求失败。

use crate::backend::CacheBackend;
use crate::config::CacheConfig;
use crate::error::{Result, ServiceError};
use crate::metrics::Metrics;
use crate::model::{User, UserInput};
use crate::recovery::ConnectionState;
use crate::serialization::{JsonSerializer, Serializer};
use crate::store::UserStore;
use crate::utils::redaction::redact_email;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// 健康检查结果
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// 数据库是否可用
    pub store: bool,
    /// 缓存连接状态
    pub cache: String,
    /// 缓存后端名称
    pub cache_backend: &'static str,
    /// 服务版本
    pub version: &'static str,
}

impl HealthReport {
    /// 服务是否可用；缓存故障只是降级，不影响可用性
    pub fn is_healthy(&self) -> bool {
        self.store
    }
}

/// 一次回源的进度，由领头者发布给等待者
#[derive(Debug, Clone)]
enum Flight {
    Pending,
    Loaded(Arc<Vec<User>>),
    Failed(String),
}

type FlightMap = DashMap<String, watch::Receiver<Flight>>;

enum Role {
    Leader(watch::Sender<Flight>),
    Follower(watch::Receiver<Flight>),
}

/// 领头者持有；无论正常结束还是被取消都会移除登记
struct FlightGuard<'a> {
    map: &'a FlightMap,
    key: &'a str,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.map.remove(self.key);
    }
}

/// Cache-aside 协调器
///
/// 持有数据库与缓存的句柄，克隆开销很小。
#[derive(Clone)]
pub struct Coordinator {
    store: Arc<dyn UserStore>,
    cache: Arc<dyn CacheBackend>,
    serializer: JsonSerializer,
    list_key: String,
    list_ttl_secs: u64,
    /// 同一进程内正在进行的回源
    in_flight: Option<Arc<FlightMap>>,
    metrics: Arc<Metrics>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("cache", &self.cache.name())
            .field("list_key", &self.list_key)
            .field("list_ttl_secs", &self.list_ttl_secs)
            .field("single_flight", &self.in_flight.is_some())
            .finish()
    }
}

impl Coordinator {
    /// 创建协调器
    ///
    /// # 参数
    ///
    /// * `store` - 用户存储
    /// * `cache` - 缓存后端
    /// * `config` - 缓存配置（键名、过期时间、压缩与合并回源开关）
    /// * `metrics` - 指标收集器
    pub fn new(
        store: Arc<dyn UserStore>,
        cache: Arc<dyn CacheBackend>,
        config: &CacheConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            cache,
            serializer: JsonSerializer::from_flag(config.compress),
            list_key: config.list_key.clone(),
            list_ttl_secs: config.list_ttl_secs,
            in_flight: config.single_flight.then(|| Arc::new(DashMap::new())),
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// 缓存连接状态
    pub fn cache_state(&self) -> ConnectionState {
        self.cache.state()
    }

    /// 返回全部用户，按 id 升序
    #[instrument(skip(self), level = "debug")]
    pub async fn list_all(&self) -> Result<Vec<User>> {
        if let Some(users) = self.read_cached().await {
            return Ok(users);
        }

        let Some(in_flight) = &self.in_flight else {
            return self.load_and_populate().await;
        };
        // 缓存不可用时排队没有意义，各自回源
        if !self.cache.state().is_connected() {
            return self.load_and_populate().await;
        }

        // 先决定角色再 await，避免持有分片锁跨越挂起点
        let role = match in_flight.entry(self.list_key.clone()) {
            Entry::Occupied(entry) => Role::Follower(entry.get().clone()),
            Entry::Vacant(entry) => {
                let (tx, rx) = watch::channel(Flight::Pending);
                entry.insert(rx);
                Role::Leader(tx)
            }
        };

        match role {
            Role::Leader(tx) => {
                let guard = FlightGuard {
                    map: in_flight,
                    key: &self.list_key,
                };
                let result = self.load_and_populate().await;
                drop(guard);
                tx.send_replace(match &result {
                    Ok(users) => Flight::Loaded(Arc::new(users.clone())),
                    Err(ServiceError::StoreUnavailable(msg)) => Flight::Failed(msg.clone()),
                    Err(e) => Flight::Failed(e.to_string()),
                });
                result
            }
            Role::Follower(mut rx) => {
                debug!("Joining in-flight load for {}", self.list_key);
                let outcome = rx
                    .wait_for(|f| !matches!(f, Flight::Pending))
                    .await
                    .map(|f| f.clone());
                match outcome {
                    Ok(Flight::Loaded(users)) => Ok(users.as_ref().clone()),
                    Ok(Flight::Failed(msg)) => Err(ServiceError::StoreUnavailable(msg)),
                    // 领头者被取消，自行回源
                    _ => self.load_and_populate().await,
                }
            }
        }
    }

    /// 按 id 查询用户，直接读取数据库
    #[instrument(skip(self), level = "debug")]
    pub async fn get_by_id(&self, id: i32) -> Result<User> {
        self.timed("select_by_id", self.store.select_by_id(id))
            .await?
            .ok_or(ServiceError::NotFound(id))
    }

    /// 创建用户
    ///
    /// email 已存在时返回 `Conflict`，此时不失效缓存。
    #[instrument(skip(self, input), level = "debug", fields(email = %redact_email(&input.email)))]
    pub async fn create(&self, input: UserInput) -> Result<User> {
        let user = self
            .timed("insert", self.store.insert(&input.name, &input.email))
            .await?;
        info!("Created user {} ({})", user.id, redact_email(&user.email));
        self.invalidate().await;
        Ok(user)
    }

    /// 更新用户
    #[instrument(skip(self, input), level = "debug", fields(email = %redact_email(&input.email)))]
    pub async fn update(&self, id: i32, input: UserInput) -> Result<User> {
        let user = self
            .timed("update", self.store.update(id, &input.name, &input.email))
            .await?
            .ok_or(ServiceError::NotFound(id))?;
        info!("Updated user {}", user.id);
        self.invalidate().await;
        Ok(user)
    }

    /// 删除用户并返回被删除的记录
    #[instrument(skip(self), level = "debug")]
    pub async fn delete(&self, id: i32) -> Result<User> {
        let user = self
            .timed("delete_by_id", self.store.delete_by_id(id))
            .await?
            .ok_or(ServiceError::NotFound(id))?;
        info!("Deleted user {}", user.id);
        self.invalidate().await;
        Ok(user)
    }

    /// 删除列表缓存；与写操作后的失效不同，失败会返回给调用方
    #[instrument(skip(self), level = "info")]
    pub async fn flush_cache(&self) -> Result<()> {
        self.cache.delete(&self.list_key).await?;
        info!("Flushed cache key {}", self.list_key);
        Ok(())
    }

    /// 检查数据库与缓存
    pub async fn health(&self) -> HealthReport {
        let store = match self.store.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Store health check failed: {}", e);
                false
            }
        };
        let state = self.cache.state();
        self.metrics.set_cache_health(state.status_code());
        HealthReport {
            store,
            cache: state.to_string(),
            cache_backend: self.cache.name(),
            version: crate::VERSION,
        }
    }

    /// 读取列表快照；读失败或无法解码都按未命中处理
    async fn read_cached(&self) -> Option<Vec<User>> {
        match self.cache.get(&self.list_key).await {
            Ok(Some(bytes)) => match self.serializer.deserialize::<Vec<User>>(&bytes) {
                Ok(users) => {
                    debug!("Cache hit: key={}, users={}", self.list_key, users.len());
                    self.metrics.record_request("cache", "get", "hit");
                    Some(users)
                }
                Err(e) => {
                    warn!("Discarding undecodable cache entry {}: {}", self.list_key, e);
                    self.metrics.record_request("cache", "get", "corrupt");
                    if let Err(e) = self.cache.delete(&self.list_key).await {
                        debug!("Failed to delete corrupt entry: {}", e);
                    }
                    None
                }
            },
            Ok(None) => {
                debug!("Cache miss: key={}", self.list_key);
                self.metrics.record_request("cache", "get", "miss");
                None
            }
            Err(e) => {
                warn!("Cache read failed, falling back to store: {}", e);
                self.metrics.record_request("cache", "get", "error");
                None
            }
        }
    }

    /// 回源数据库并回填缓存；回填失败不影响返回值
    async fn load_and_populate(&self) -> Result<Vec<User>> {
        let users = self.timed("select_all", self.store.select_all()).await?;

        let populate = match self.serializer.serialize(&users) {
            Ok(bytes) => {
                self.cache
                    .set(&self.list_key, bytes, self.list_ttl_secs)
                    .await
            }
            Err(e) => Err(e),
        };
        match populate {
            Ok(()) => {
                debug!(
                    "Populated {} with {} users, ttl={}s",
                    self.list_key,
                    users.len(),
                    self.list_ttl_secs
                );
                self.metrics.record_request("cache", "set", "ok");
            }
            Err(e) => {
                warn!("Cache populate failed: {}", e);
                self.metrics.record_request("cache", "set", "failed");
            }
        }
        Ok(users)
    }

    /// 写操作成功后删除列表缓存
    async fn invalidate(&self) {
        match self.cache.delete(&self.list_key).await {
            Ok(()) => {
                debug!("Invalidated {}", self.list_key);
                self.metrics.record_request("cache", "delete", "ok");
            }
            Err(e) => {
                warn!(
                    "Cache invalidation failed, entry may be stale until ttl: {}",
                    e
                );
                self.metrics.record_request("cache", "delete", "failed");
            }
        }
    }

    /// 执行一次数据库操作并记录次数与耗时
    async fn timed<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let start = Instant::now();
        let result = fut.await;
        self.metrics
            .record_duration("store", op, start.elapsed().as_secs_f64());
        let outcome = match &result {
            Ok(_) => "ok",
            Err(ServiceError::Conflict(_)) => "conflict",
            Err(_) => "error",
        };
        self.metrics.record_request("store", op, outcome);
        result
    }
}
