// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::classification::CategoryHints;
use crate::domain::repositories::category_repository::CategoryRepository;
use crate::domain::repositories::work_item_repository::RepositoryError;
use crate::infrastructure::database::entities::category_definition;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{sea_query::OnConflict, DatabaseConnection, EntityTrait, Set};
use std::sync::Arc;
use uuid::Uuid;

/// 分类定义仓库实现
#[derive(Clone)]
pub struct CategoryRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl CategoryRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CategoryRepository for CategoryRepositoryImpl {
    async fn hints(&self) -> Result<CategoryHints, RepositoryError> {
        let models = category_definition::Entity::find()
            .all(self.db.as_ref())
            .await?;

        Ok(models
            .into_iter()
            .map(|m| (m.name, m.description))
            .collect())
    }

    async fn upsert(&self, name: &str, description: &str) -> Result<(), RepositoryError> {
        let model = category_definition::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.trim().to_string()),
            description: Set(description.to_string()),
            created_at: Set(Utc::now().into()),
        };

        category_definition::Entity::insert(model)
            .on_conflict(
                OnConflict::column(category_definition::Column::Name)
                    .update_column(category_definition::Column::Description)
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(())
    }
}
