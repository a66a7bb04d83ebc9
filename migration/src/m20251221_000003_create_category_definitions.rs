// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm_migration::prelude::*;

/// 分类定义表迁移
///
/// 分类名称与描述会作为提示信息传给分类器
#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CategoryDefinitions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CategoryDefinitions::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(CategoryDefinitions::Name)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(CategoryDefinitions::Description)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CategoryDefinitions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CategoryDefinitions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CategoryDefinitions {
    Table,
    Id,
    Name,
    Description,
    CreatedAt,
}
