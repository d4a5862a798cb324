//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了服务的指标收集和导出功能。

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{span, Level};

/// 指标收集器
///
/// 每个 `AppContext` 持有一个实例，通过 `Arc` 在协调器与处理器之间共享。
#[derive(Debug, Default)]
pub struct Metrics {
    /// 请求总数统计
    /// key: (layer, op, result)
    requests_total: Mutex<BTreeMap<(String, String, String), u64>>,
    /// 操作耗时，(累计秒数, 次数)
    /// key: (layer, op)
    operation_duration: Mutex<BTreeMap<(String, String), (f64, u64)>>,
    /// 缓存连接状态码（0: 失败, 1: 正常, 2: 重连中）
    cache_health: Mutex<Option<u8>>,
}

/// 获取锁；持锁线程 panic 后数据仍然可用，计数器不需要因此失效
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录请求指标
    ///
    /// # 参数
    ///
    /// * `layer` - 层（cache/store）
    /// * `op` - 操作类型（get/set/delete/select_all/...）
    /// * `result` - 操作结果（hit/miss/error/ok/failed）
    pub fn record_request(&self, layer: &str, op: &str, result: &str) {
        let span = span!(Level::TRACE, "metrics_request", layer, op, result);
        let _enter = span.enter();
        let mut map = lock(&self.requests_total);
        *map.entry((layer.to_string(), op.to_string(), result.to_string()))
            .or_insert(0) += 1;
    }

    /// 记录操作耗时
    pub fn record_duration(&self, layer: &str, op: &str, duration_secs: f64) {
        let mut map = lock(&self.operation_duration);
        let entry = map
            .entry((layer.to_string(), op.to_string()))
            .or_insert((0.0, 0));
        entry.0 += duration_secs;
        entry.1 += 1;
    }

    /// 设置缓存健康状态码
    pub fn set_cache_health(&self, status: u8) {
        *lock(&self.cache_health) = Some(status);
    }

    /// 读取某个请求计数，不存在时为 0
    pub fn request_count(&self, layer: &str, op: &str, result: &str) -> u64 {
        lock(&self.requests_total)
            .get(&(layer.to_string(), op.to_string(), result.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// 以 Prometheus 文本格式导出所有指标
    pub fn render(&self) -> String {
        let mut output = String::new();

        let reqs = lock(&self.requests_total);
        if !reqs.is_empty() {
            output.push_str("# TYPE usercache_requests_total counter\n");
        }
        for ((layer, op, result), v) in reqs.iter() {
            output.push_str(&format!(
                "usercache_requests_total{{layer=\"{}\",op=\"{}\",result=\"{}\"}} {}\n",
                layer, op, result, v
            ));
        }
        drop(reqs);

        let dur = lock(&self.operation_duration);
        for ((layer, op), (total, count)) in dur.iter() {
            output.push_str(&format!(
                "usercache_operation_duration_seconds_sum{{layer=\"{}\",op=\"{}\"}} {}\n",
                layer, op, total
            ));
            output.push_str(&format!(
                "usercache_operation_duration_seconds_count{{layer=\"{}\",op=\"{}\"}} {}\n",
                layer, op, count
            ));
        }
        drop(dur);

        if let Some(status) = *lock(&self.cache_health) {
            output.push_str(&format!("usercache_cache_health_status {}\n", status));
        }
        output
    }
}
