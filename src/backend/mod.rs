//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存后端接口及其实现：共享的 Redis 后端与进程内的 Moka 后端。

pub mod memory;
pub mod redis;

use crate::error::Result;
use crate::recovery::ConnectionState;
use async_trait::async_trait;

pub use self::memory::MemoryBackend;
pub use self::redis::RedisBackend;

/// 缓存后端特征
///
/// 只提供单键的读、带过期时间的写和删除；键之间没有顺序或事务保证。
/// 后端不可用时返回 `ServiceError::CacheDegraded`，由调用方决定如何降级。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// 读取缓存值，不存在或已过期时返回 None
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// 写入缓存值，`ttl_secs` 秒后过期
    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()>;

    /// 删除缓存项，键不存在时同样视为成功
    async fn delete(&self, key: &str) -> Result<()>;

    /// 检查后端连接
    async fn ping(&self) -> Result<()>;

    /// 当前连接状态
    fn state(&self) -> ConnectionState;

    /// 后端名称，用于日志和指标
    fn name(&self) -> &'static str;
}
