//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 并发读写测试

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use usercache::backend::{CacheBackend, MemoryBackend};
use usercache::error::Result;
use usercache::recovery::ConnectionState;
use usercache::{ServiceError, UserInput};

#[path = "../common/mod.rs"]
mod common;

/// 同一进程内并发的未命中只回源一次
#[tokio::test]
async fn test_single_flight_coalesces_misses() {
    common::setup_logging();
    let store = Arc::new(common::CountingStore::with_delay(
        common::sqlite_store().await,
        Duration::from_millis(50),
    ));
    let cache = Arc::new(MemoryBackend::new(16));
    let coordinator = common::coordinator_with(store.clone(), cache, true);
    coordinator
        .create(UserInput::new("A", "a@x.com"))
        .await
        .unwrap();

    let results = join_all((0..20).map(|_| {
        let c = coordinator.clone();
        tokio::spawn(async move { c.list_all().await })
    }))
    .await;

    for result in results {
        assert_eq!(result.unwrap().unwrap().len(), 1);
    }
    assert_eq!(store.select_all_calls(), 1);
}

/// 连接正常但写入总是失败的缓存，例如 Redis 内存已满
struct RejectingWrites(MemoryBackend);

#[async_trait]
impl CacheBackend for RejectingWrites {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.0.get(key).await
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl_secs: u64) -> Result<()> {
        Err(ServiceError::CacheDegraded("OOM command not allowed".to_string()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.0.delete(key).await
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::Connected
    }

    fn name(&self) -> &'static str {
        "rejecting"
    }
}

/// 回填失败时，等待者直接拿到领头者的结果，而不是排队逐个回源
#[tokio::test]
async fn test_single_flight_shares_result_when_populate_fails() {
    common::setup_logging();
    let store = Arc::new(common::CountingStore::with_delay(
        common::sqlite_store().await,
        Duration::from_millis(100),
    ));
    let cache = Arc::new(RejectingWrites(MemoryBackend::new(16)));
    let coordinator = common::coordinator_with(store.clone(), cache, true);
    coordinator
        .create(UserInput::new("A", "a@x.com"))
        .await
        .unwrap();

    let start = Instant::now();
    let results = join_all((0..10).map(|_| {
        let c = coordinator.clone();
        tokio::spawn(async move { c.list_all().await })
    }))
    .await;
    let elapsed = start.elapsed();

    let lists: Vec<_> = results.into_iter().map(|r| r.unwrap().unwrap()).collect();
    assert!(lists.iter().all(|l| l == &lists[0] && l.len() == 1));
    assert_eq!(store.select_all_calls(), 1);
    assert!(elapsed < Duration::from_millis(500), "took {:?}", elapsed);

    // 上一轮结束后登记已移除，下一次未命中重新回源
    assert_eq!(coordinator.list_all().await.unwrap(), lists[0]);
    assert_eq!(store.select_all_calls(), 2);
}

/// 关闭合并时每个并发未命中各自回源，结果一致
#[tokio::test]
async fn test_without_single_flight_each_miss_loads() {
    let store = Arc::new(common::CountingStore::with_delay(
        common::sqlite_store().await,
        Duration::from_millis(50),
    ));
    let cache = Arc::new(MemoryBackend::new(16));
    let coordinator = common::coordinator_with(store.clone(), cache, false);

    let results = join_all((0..5).map(|_| coordinator.list_all())).await;
    for result in results {
        assert!(result.unwrap().is_empty());
    }
    assert_eq!(store.select_all_calls(), 5);
}

/// 并发写入后，冷缓存读取与数据库一致
#[tokio::test]
async fn test_concurrent_writes_then_cold_read() {
    let (coordinator, cache) = common::memory_coordinator().await;

    let creates = join_all((0..10).map(|i| {
        let c = coordinator.clone();
        async move {
            c.create(UserInput::new(
                format!("user{}", i),
                format!("user{}@x.com", i),
            ))
            .await
        }
    }))
    .await;
    assert!(creates.iter().all(|r| r.is_ok()));

    // 读写交错
    let mixed = join_all((0..10).map(|i| {
        let c = coordinator.clone();
        async move {
            if i % 2 == 0 {
                c.list_all().await.map(|_| ())
            } else {
                c.delete(i).await.map(|_| ())
            }
        }
    }))
    .await;
    assert!(mixed.iter().all(|r| r.is_ok()));

    cache.delete("users:all").await.unwrap();
    let ids: Vec<i32> = coordinator
        .list_all()
        .await
        .unwrap()
        .iter()
        .map(|u| u.id)
        .collect();
    assert_eq!(ids, vec![2, 4, 6, 8, 10]);
}

/// 同一 email 的并发创建只有一个成功
#[tokio::test]
async fn test_concurrent_duplicate_email() {
    let (coordinator, _cache) = common::memory_coordinator().await;
    let results = join_all((0..5).map(|_| {
        let c = coordinator.clone();
        async move { c.create(UserInput::new("Same", "same@x.com")).await }
    }))
    .await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, usercache::ServiceError::Conflict(_))));
    assert_eq!(coordinator.list_all().await.unwrap().len(), 1);
}
