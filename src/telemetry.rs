//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了日志输出和链路追踪的初始化。

use crate::config::LoggingConfig;
use crate::error::{Result, ServiceError};
use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::trace::TracerProvider as SdkTracerProvider;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// 追踪守卫，drop 时关闭全局 tracer provider
#[must_use = "dropping the guard shuts down the tracer provider"]
#[derive(Debug)]
pub struct TelemetryGuard {
    _private: (),
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        global::shutdown_tracer_provider();
    }
}

/// 初始化 tracing subscriber 与 OpenTelemetry tracer
///
/// 应在进程启动时调用一次。`RUST_LOG` 存在时优先于配置中的过滤器。
/// 未配置导出器时 tracer provider 不导出任何 span，但 span 上下文照常传播。
///
/// # 参数
///
/// * `service_name` - 服务名称
/// * `config` - 日志配置
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<TelemetryGuard> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter).map_err(|e| {
            ServiceError::Configuration(format!("Invalid log filter '{}': {}", config.filter, e))
        })?,
    };

    let provider = SdkTracerProvider::builder().build();
    global::set_tracer_provider(provider.clone());
    let tracer = provider.tracer(service_name.to_string());
    let telemetry = tracing_opentelemetry::layer().with_tracer(tracer);

    let fmt_layer = if config.json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(telemetry)
        .with(filter)
        .try_init()
        .map_err(|e| ServiceError::Configuration(format!("Tracing already initialized: {}", e)))?;

    Ok(TelemetryGuard { _private: () })
}
