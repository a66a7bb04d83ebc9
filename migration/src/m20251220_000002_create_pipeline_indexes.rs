use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Batch selection: status filter, then priority and age ordering
        manager
            .create_index(
                Index::create()
                    .name("idx_work_items_status_priority_created_at")
                    .table(WorkItems::Table)
                    .col(WorkItems::Status)
                    .col(WorkItems::Priority)
                    .col(WorkItems::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // Staleness sweep
        manager
            .create_index(
                Index::create()
                    .name("idx_work_items_status_updated_at")
                    .table(WorkItems::Table)
                    .col(WorkItems::Status)
                    .col(WorkItems::UpdatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_audit_logs_item_id")
                    .table(AuditLogs::Table)
                    .col(AuditLogs::ItemId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_audit_logs_item_id")
                    .table(AuditLogs::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_work_items_status_updated_at")
                    .table(WorkItems::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_work_items_status_priority_created_at")
                    .table(WorkItems::Table)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum WorkItems {
    Table,
    Status,
    Priority,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum AuditLogs {
    Table,
    ItemId,
}
