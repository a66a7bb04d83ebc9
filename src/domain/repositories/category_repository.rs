// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::classification::CategoryHints;
use crate::domain::repositories::work_item_repository::RepositoryError;
use async_trait::async_trait;

/// 分类定义仓库特质
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// 读取全部分类定义作为分类提示
    async fn hints(&self) -> Result<CategoryHints, RepositoryError>;
    /// 新增或更新分类定义
    async fn upsert(&self, name: &str, description: &str) -> Result<(), RepositoryError>;
}
