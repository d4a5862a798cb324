//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 缓存降级与数据库故障测试

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use usercache::backend::{CacheBackend, MemoryBackend};
use usercache::error::Result;
use usercache::model::User;
use usercache::recovery::ConnectionState;
use usercache::store::UserStore;
use usercache::{ServiceError, UserInput};

#[path = "../common/mod.rs"]
mod common;

/// 可以按操作注入故障的缓存
#[derive(Default)]
struct FailingCache {
    inner: Option<MemoryBackend>,
    fail_get: AtomicBool,
    fail_set: AtomicBool,
    fail_delete: AtomicBool,
    calls: AtomicUsize,
}

impl FailingCache {
    fn down() -> Self {
        Self {
            inner: None,
            fail_get: AtomicBool::new(true),
            fail_set: AtomicBool::new(true),
            fail_delete: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }

    fn over_memory() -> Self {
        Self {
            inner: Some(MemoryBackend::new(16)),
            ..Default::default()
        }
    }

    fn check(&self, flag: &AtomicBool) -> Result<&MemoryBackend> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match (&self.inner, flag.load(Ordering::SeqCst)) {
            (Some(inner), false) => Ok(inner),
            _ => Err(ServiceError::CacheDegraded("模拟连接失败".to_string())),
        }
    }
}

#[async_trait]
impl CacheBackend for FailingCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check(&self.fail_get)?.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()> {
        self.check(&self.fail_set)?.set(key, value, ttl_secs).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check(&self.fail_delete)?.delete(key).await
    }

    async fn ping(&self) -> Result<()> {
        Err(ServiceError::CacheDegraded("模拟连接失败".to_string()))
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::Reconnecting { attempt: 1 }
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// 所有操作都失败的数据库
struct DownStore;

#[async_trait]
impl UserStore for DownStore {
    async fn create_table_if_absent(&self) -> Result<()> {
        Err(ServiceError::StoreUnavailable("connection refused".into()))
    }
    async fn insert(&self, _name: &str, _email: &str) -> Result<User> {
        Err(ServiceError::StoreUnavailable("connection refused".into()))
    }
    async fn select_all(&self) -> Result<Vec<User>> {
        Err(ServiceError::StoreUnavailable("connection refused".into()))
    }
    async fn select_by_id(&self, _id: i32) -> Result<Option<User>> {
        Err(ServiceError::StoreUnavailable("connection refused".into()))
    }
    async fn update(&self, _id: i32, _name: &str, _email: &str) -> Result<Option<User>> {
        Err(ServiceError::StoreUnavailable("connection refused".into()))
    }
    async fn delete_by_id(&self, _id: i32) -> Result<Option<User>> {
        Err(ServiceError::StoreUnavailable("connection refused".into()))
    }
    async fn ping(&self) -> Result<()> {
        Err(ServiceError::StoreUnavailable("connection refused".into()))
    }
}

/// 缓存完全不可用时，所有操作仍然成功
#[tokio::test]
async fn test_requests_succeed_with_cache_down() {
    common::setup_logging();
    let cache = Arc::new(FailingCache::down());
    let store = Arc::new(common::sqlite_store().await);
    let coordinator = common::coordinator_with(store, cache.clone(), true);

    let a = coordinator
        .create(UserInput::new("A", "a@x.com"))
        .await
        .unwrap();
    assert_eq!(coordinator.list_all().await.unwrap(), vec![a.clone()]);
    coordinator
        .update(a.id, UserInput::new("A2", "a@x.com"))
        .await
        .unwrap();
    assert_eq!(coordinator.list_all().await.unwrap()[0].name, "A2");
    coordinator.delete(a.id).await.unwrap();
    assert!(coordinator.list_all().await.unwrap().is_empty());

    assert!(cache.calls.load(Ordering::SeqCst) > 0);
    let metrics = coordinator.metrics();
    assert_eq!(metrics.request_count("cache", "get", "error"), 3);
    assert_eq!(metrics.request_count("cache", "delete", "failed"), 3);

    let report = coordinator.health().await;
    assert!(report.is_healthy());
    assert_eq!(report.cache_backend, "failing");
}

/// 回填失败时仍返回数据库结果，下次读取继续回源
#[tokio::test]
async fn test_populate_failure_is_absorbed() {
    let cache = Arc::new(FailingCache::over_memory());
    cache.fail_set.store(true, Ordering::SeqCst);
    let store = Arc::new(common::CountingStore::new(common::sqlite_store().await));
    let coordinator = common::coordinator_with(store.clone(), cache.clone(), false);

    coordinator
        .create(UserInput::new("A", "a@x.com"))
        .await
        .unwrap();
    assert_eq!(coordinator.list_all().await.unwrap().len(), 1);
    assert_eq!(coordinator.list_all().await.unwrap().len(), 1);
    assert_eq!(store.select_all_calls(), 2);

    cache.fail_set.store(false, Ordering::SeqCst);
    coordinator.list_all().await.unwrap();
    coordinator.list_all().await.unwrap();
    assert_eq!(store.select_all_calls(), 3);
}

/// 失效失败不影响写操作结果，旧快照保留到过期
#[tokio::test]
async fn test_invalidation_failure_keeps_write_result() {
    let cache = Arc::new(FailingCache::over_memory());
    let store = Arc::new(common::sqlite_store().await);
    let coordinator = common::coordinator_with(store, cache.clone(), false);

    coordinator.list_all().await.unwrap();
    cache.fail_delete.store(true, Ordering::SeqCst);

    let created = coordinator
        .create(UserInput::new("A", "a@x.com"))
        .await
        .unwrap();
    assert_eq!(created.id, 1);

    // 快照未被删除，读取到的是写入前的列表
    assert!(coordinator.list_all().await.unwrap().is_empty());
    assert_eq!(
        coordinator
            .metrics()
            .request_count("cache", "delete", "failed"),
        1
    );
}

/// 数据库故障作为 StoreUnavailable 返回，且不触发失效
#[tokio::test]
async fn test_store_down_propagates() {
    let cache = Arc::new(FailingCache::over_memory());
    let coordinator = common::coordinator_with(Arc::new(DownStore), cache.clone(), true);

    assert!(matches!(
        coordinator.list_all().await.unwrap_err(),
        ServiceError::StoreUnavailable(_)
    ));
    assert!(matches!(
        coordinator.get_by_id(1).await.unwrap_err(),
        ServiceError::StoreUnavailable(_)
    ));

    let calls_before = cache.calls.load(Ordering::SeqCst);
    assert!(matches!(
        coordinator
            .create(UserInput::new("A", "a@x.com"))
            .await
            .unwrap_err(),
        ServiceError::StoreUnavailable(_)
    ));
    assert!(coordinator.delete(1).await.is_err());
    assert_eq!(cache.calls.load(Ordering::SeqCst), calls_before);

    assert!(!coordinator.health().await.is_healthy());
}
