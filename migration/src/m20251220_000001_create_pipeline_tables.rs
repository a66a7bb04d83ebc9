// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm_migration::prelude::*;

/// 流水线核心表迁移
#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    /// 应用数据库迁移
    ///
    /// # 参数
    ///
    /// * `manager` - 数据库模式管理器
    ///
    /// # 返回值
    ///
    /// * `Ok(())` - 迁移成功
    /// * `Err(DbErr)` - 迁移失败
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 1. work_items (no dependencies)
        manager
            .create_table(
                Table::create()
                    .table(WorkItems::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(WorkItems::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(WorkItems::Domain)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(WorkItems::Status).string().not_null())
                    .col(
                        ColumnDef::new(WorkItems::Priority)
                            .integer()
                            .not_null()
                            .default(3),
                    )
                    .col(
                        ColumnDef::new(WorkItems::Source)
                            .string()
                            .not_null()
                            .default("manual"),
                    )
                    .col(
                        ColumnDef::new(WorkItems::RetryCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(WorkItems::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(WorkItems::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(WorkItems::CompletedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        // 2. fetch_results (depends on work_items)
        manager
            .create_table(
                Table::create()
                    .table(FetchResults::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FetchResults::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(FetchResults::ItemId)
                            .uuid()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(FetchResults::Url).string().not_null())
                    .col(ColumnDef::new(FetchResults::ContentLocation).string())
                    .col(ColumnDef::new(FetchResults::RawStatus).integer())
                    .col(ColumnDef::new(FetchResults::Error).text())
                    .col(
                        ColumnDef::new(FetchResults::FetchedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_fetch_results_item_id")
                            .from(FetchResults::Table, FetchResults::ItemId)
                            .to(WorkItems::Table, WorkItems::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // 3. classification_results (depends on work_items)
        manager
            .create_table(
                Table::create()
                    .table(ClassificationResults::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ClassificationResults::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ClassificationResults::ItemId)
                            .uuid()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(ClassificationResults::Category)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClassificationResults::IsMalicious)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ClassificationResults::Confidence)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(ColumnDef::new(ClassificationResults::Summary).text().not_null())
                    .col(ColumnDef::new(ClassificationResults::Model).string().not_null())
                    .col(
                        ColumnDef::new(ClassificationResults::AnalyzedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_classification_results_item_id")
                            .from(ClassificationResults::Table, ClassificationResults::ItemId)
                            .to(WorkItems::Table, WorkItems::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // 4. audit_logs (item reference is nullable, no foreign key: entries outlive items)
        manager
            .create_table(
                Table::create()
                    .table(AuditLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AuditLogs::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AuditLogs::ItemId).uuid())
                    .col(ColumnDef::new(AuditLogs::Stage).string().not_null())
                    .col(ColumnDef::new(AuditLogs::Level).string().not_null())
                    .col(ColumnDef::new(AuditLogs::Message).text().not_null())
                    .col(
                        ColumnDef::new(AuditLogs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 5. policy_rules
        manager
            .create_table(
                Table::create()
                    .table(PolicyRules::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PolicyRules::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PolicyRules::Pattern).string().not_null())
                    .col(ColumnDef::new(PolicyRules::RuleType).string().not_null())
                    .col(
                        ColumnDef::new(PolicyRules::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(PolicyRules::Description).string())
                    .col(
                        ColumnDef::new(PolicyRules::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    /// 回滚数据库迁移
    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PolicyRules::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AuditLogs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ClassificationResults::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(FetchResults::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(WorkItems::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum WorkItems {
    Table,
    Id,
    Domain,
    Status,
    Priority,
    Source,
    RetryCount,
    CreatedAt,
    UpdatedAt,
    CompletedAt,
}

#[derive(DeriveIden)]
enum FetchResults {
    Table,
    Id,
    ItemId,
    Url,
    ContentLocation,
    RawStatus,
    Error,
    FetchedAt,
}

#[derive(DeriveIden)]
enum ClassificationResults {
    Table,
    Id,
    ItemId,
    Category,
    IsMalicious,
    Confidence,
    Summary,
    Model,
    AnalyzedAt,
}

#[derive(DeriveIden)]
enum AuditLogs {
    Table,
    Id,
    ItemId,
    Stage,
    Level,
    Message,
    CreatedAt,
}

#[derive(DeriveIden)]
enum PolicyRules {
    Table,
    Id,
    Pattern,
    RuleType,
    IsActive,
    Description,
    CreatedAt,
}
