// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::audit_log::{AuditLogEntry, NewAuditEntry};
use crate::domain::repositories::audit_log_repository::AuditLogRepository;
use crate::domain::repositories::work_item_repository::RepositoryError;
use crate::infrastructure::database::entities::audit_log;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, NotSet,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;
use uuid::Uuid;

/// 审计日志仓库实现
#[derive(Clone)]
pub struct AuditLogRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl AuditLogRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl From<audit_log::Model> for AuditLogEntry {
    fn from(model: audit_log::Model) -> Self {
        Self {
            id: model.id,
            item_id: model.item_id,
            stage: model.stage,
            level: model.level,
            message: model.message,
            created_at: model.created_at,
        }
    }
}

/// 在给定连接（或事务）上追加一条审计记录
///
/// 状态变更和它的审计记录需要在同一个事务中写入，
/// 因此这里接受任意 `ConnectionTrait`。
pub(crate) async fn insert_entry<C: ConnectionTrait>(
    conn: &C,
    entry: NewAuditEntry,
) -> Result<(), RepositoryError> {
    let model = audit_log::ActiveModel {
        id: NotSet,
        item_id: Set(entry.item_id),
        stage: Set(entry.stage.to_string()),
        level: Set(entry.level.to_string()),
        message: Set(entry.message),
        created_at: Set(Utc::now().into()),
    };
    model.insert(conn).await?;
    Ok(())
}

#[async_trait]
impl AuditLogRepository for AuditLogRepositoryImpl {
    async fn append(&self, entry: NewAuditEntry) -> Result<(), RepositoryError> {
        insert_entry(self.db.as_ref(), entry).await
    }

    async fn recent(&self, limit: u64) -> Result<Vec<AuditLogEntry>, RepositoryError> {
        let models = audit_log::Entity::find()
            .order_by_desc(audit_log::Column::Id)
            .limit(limit)
            .all(self.db.as_ref())
            .await?;

        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn find_by_item(&self, item_id: Uuid) -> Result<Vec<AuditLogEntry>, RepositoryError> {
        let models = audit_log::Entity::find()
            .filter(audit_log::Column::ItemId.eq(item_id))
            .order_by_asc(audit_log::Column::Id)
            .all(self.db.as_ref())
            .await?;

        Ok(models.into_iter().map(Into::into).collect())
    }
}
