//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! usercache - 带 cache-aside 缓存层的用户服务
//!
//! 数据库是用户记录的唯一数据源，Redis（或进程内缓存）保存用户列表快照。
//! 读列表时先查缓存，未命中回源并回填；写操作提交后删除快照。
//! 缓存不可用时服务降级为直接读写数据库，请求不会因此失败。

pub mod app;
pub mod backend;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod http;
pub mod metrics;
pub mod model;
pub mod recovery;
pub mod serialization;
pub mod store;
pub mod telemetry;
pub mod utils;

pub use app::AppContext;
pub use config::Config;
pub use coordinator::Coordinator;
pub use error::{Result, ServiceError};
pub use model::{User, UserInput};

/// usercache 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
