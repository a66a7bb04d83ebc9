// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::audit_log::{AuditLogEntry, NewAuditEntry};
use crate::domain::repositories::work_item_repository::RepositoryError;
use async_trait::async_trait;
use uuid::Uuid;

/// 审计日志仓库特质
///
/// 只追加，不提供修改和删除。
#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    /// 追加一条审计记录
    async fn append(&self, entry: NewAuditEntry) -> Result<(), RepositoryError>;
    /// 最近的审计记录，最新的在前
    async fn recent(&self, limit: u64) -> Result<Vec<AuditLogEntry>, RepositoryError>;
    /// 某个工作项的全部审计记录，按写入顺序
    async fn find_by_item(&self, item_id: Uuid) -> Result<Vec<AuditLogEntry>, RepositoryError>;
}
