//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了JSON序列化器的实现。

use super::Serializer;
use crate::error::{Result, ServiceError};
use serde::{de::DeserializeOwned, Serialize};

/// JSON序列化器
///
/// 基于serde_json，可选 gzip 压缩。压缩开关必须在读写两端一致，
/// 否则读取方会把快照当作损坏数据丢弃。
#[derive(Clone, Debug, Default)]
pub struct JsonSerializer {
    compress: bool,
}

impl JsonSerializer {
    /// 创建新的JSON序列化器
    pub fn new() -> Self {
        Self { compress: false }
    }

    /// 创建启用压缩的JSON序列化器
    pub fn with_compression() -> Self {
        Self { compress: true }
    }

    /// 根据配置开关创建
    pub fn from_flag(compress: bool) -> Self {
        Self { compress }
    }
}

impl Serializer for JsonSerializer {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let json_bytes =
            serde_json::to_vec(value).map_err(|e| ServiceError::Serialization(e.to_string()))?;

        if !self.compress {
            return Ok(json_bytes);
        }

        #[cfg(feature = "flate2")]
        {
            use flate2::write::GzEncoder;
            use flate2::Compression;
            use std::io::Write;

            let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
            encoder
                .write_all(&json_bytes)
                .map_err(|e| ServiceError::Serialization(e.to_string()))?;
            encoder
                .finish()
                .map_err(|e| ServiceError::Serialization(e.to_string()))
        }

        #[cfg(not(feature = "flate2"))]
        {
            Ok(json_bytes)
        }
    }

    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        #[cfg(feature = "flate2")]
        let decoded = if self.compress {
            use flate2::read::GzDecoder;
            use std::io::Read;

            let mut decoder = GzDecoder::new(data);
            let mut decoded = Vec::new();
            decoder
                .read_to_end(&mut decoded)
                .map_err(|e| ServiceError::Serialization(e.to_string()))?;
            std::borrow::Cow::Owned(decoded)
        } else {
            std::borrow::Cow::Borrowed(data)
        };

        #[cfg(not(feature = "flate2"))]
        let decoded = std::borrow::Cow::Borrowed(data);

        serde_json::from_slice(&decoded).map_err(|e| ServiceError::Serialization(e.to_string()))
    }
}
