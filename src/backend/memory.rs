//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了进程内缓存后端，基于Moka。

use super::CacheBackend;
use crate::error::Result;
use crate::recovery::ConnectionState;
use async_trait::async_trait;
use moka::future::Cache;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// 进程内缓存后端
///
/// 值连同过期时刻一起保存，读取时发现过期即删除。适用于单实例部署和测试。
#[derive(Clone)]
pub struct MemoryBackend {
    cache: Cache<String, (Vec<u8>, Option<Instant>)>,
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

impl MemoryBackend {
    /// 创建新的进程内缓存后端
    ///
    /// # 参数
    ///
    /// * `capacity` - 最大条目数
    pub fn new(capacity: u64) -> Self {
        Self {
            cache: Cache::builder().max_capacity(capacity).build(),
        }
    }

    /// 清空缓存
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    #[instrument(skip(self), level = "debug")]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.cache.get(key).await {
            Some((_, Some(expire_at))) if Instant::now() >= expire_at => {
                self.cache.remove(key).await;
                debug!("memory get: key={}, expired=true, removed", key);
                Ok(None)
            }
            Some((bytes, _)) => Ok(Some(bytes)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()> {
        let expire_at = if ttl_secs > 0 {
            Some(Instant::now() + Duration::from_secs(ttl_secs))
        } else {
            None
        };
        self.cache.insert(key.to_string(), (value, expire_at)).await;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, key: &str) -> Result<()> {
        self.cache.remove(key).await;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::Connected
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
