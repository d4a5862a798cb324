//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存连接的恢复机制。

pub mod supervisor;

pub use supervisor::{
    Backoff, ConnectionState, ConnectionSupervisor, Reconnectable, StateHandle, SupervisorConfig,
};
