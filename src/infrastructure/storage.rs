// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::config::settings::StorageSettings;
use crate::domain::repositories::storage_repository::{ContentStore, StorageError};

/// 本地文件系统内容存储
///
/// 每条内容保存为 `base_path` 下的一个文本文件，位置即文件的完整路径。
pub struct LocalContentStore {
    base_path: PathBuf,
}

impl LocalContentStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn full_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty() || key.contains(['/', '\\']) || key.contains("..") {
            return Err(StorageError::Other(format!("Invalid content key: {}", key)));
        }
        Ok(self.base_path.join(key))
    }
}

#[async_trait]
impl ContentStore for LocalContentStore {
    async fn save(&self, key: &str, content: &str) -> Result<String, StorageError> {
        let full_path = self.full_path(key)?;

        // 确保目录存在
        fs::create_dir_all(&self.base_path).await?;

        let mut file = fs::File::create(&full_path).await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;

        Ok(full_path.to_string_lossy().to_string())
    }

    async fn load(&self, location: &str) -> Result<Option<String>, StorageError> {
        match fs::read(location).await {
            Ok(data) => Ok(Some(String::from_utf8(data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn exists(&self, location: &str) -> Result<bool, StorageError> {
        Ok(fs::try_exists(Path::new(location)).await?)
    }
}

/// 内存内容存储（用于测试）
#[derive(Clone, Default)]
pub struct InMemoryContentStore {
    data: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已保存的内容条数
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }

    /// 直接写入某个位置，用于构造测试场景
    pub async fn put(&self, location: &str, content: &str) {
        self.data
            .write()
            .await
            .insert(location.to_string(), content.to_string());
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn save(&self, key: &str, content: &str) -> Result<String, StorageError> {
        let location = format!("memory://{}", key);
        self.put(&location, content).await;
        Ok(location)
    }

    async fn load(&self, location: &str) -> Result<Option<String>, StorageError> {
        Ok(self.data.read().await.get(location).cloned())
    }

    async fn exists(&self, location: &str) -> Result<bool, StorageError> {
        Ok(self.data.read().await.contains_key(location))
    }
}

/// 内容存储工厂函数
pub fn create_content_store(
    settings: &StorageSettings,
) -> Result<Arc<dyn ContentStore>, StorageError> {
    match settings.storage_type.as_str() {
        "local" => Ok(Arc::new(LocalContentStore::new(&settings.local_path))),
        "memory" => Ok(Arc::new(InMemoryContentStore::new())),
        other => Err(StorageError::Other(format!(
            "Unsupported storage type: {}",
            other
        ))),
    }
}
