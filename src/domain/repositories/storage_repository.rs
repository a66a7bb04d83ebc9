// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use thiserror::Error;

/// 存储错误类型
#[derive(Error, Debug)]
pub enum StorageError {
    /// IO错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// 内容不是有效的UTF-8
    #[error("Content is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
    /// 存储错误
    #[error("Storage error: {0}")]
    Other(String),
}

/// 抓取内容存储特质
///
/// 抓取周期保存内容并把返回的位置写入抓取结果，分析周期按位置读回。
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// 保存内容，返回可用于读回的位置
    async fn save(&self, key: &str, content: &str) -> Result<String, StorageError>;

    /// 按位置读回内容，不存在时返回None
    async fn load(&self, location: &str) -> Result<Option<String>, StorageError>;

    /// 检查位置上是否有内容
    async fn exists(&self, location: &str) -> Result<bool, StorageError>;
}
