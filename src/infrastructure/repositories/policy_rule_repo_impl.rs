// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::policy_rule::{PolicyRule, RuleType};
use crate::domain::repositories::policy_rule_repository::PolicyRuleRepository;
use crate::domain::repositories::work_item_repository::RepositoryError;
use crate::infrastructure::database::entities::policy_rule;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// 策略规则仓库实现
#[derive(Clone)]
pub struct PolicyRuleRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl PolicyRuleRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

fn to_rule(model: policy_rule::Model) -> Option<PolicyRule> {
    let Ok(rule_type) = model.rule_type.parse::<RuleType>() else {
        warn!(id = %model.id, rule_type = %model.rule_type, "Skipping policy rule with unknown type");
        return None;
    };
    Some(PolicyRule {
        id: model.id,
        pattern: model.pattern,
        rule_type,
        is_active: model.is_active,
        description: model.description,
        created_at: model.created_at,
    })
}

#[async_trait]
impl PolicyRuleRepository for PolicyRuleRepositoryImpl {
    async fn find_active(&self) -> Result<Vec<PolicyRule>, RepositoryError> {
        let models = policy_rule::Entity::find()
            .filter(policy_rule::Column::IsActive.eq(true))
            .order_by_asc(policy_rule::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;

        Ok(models.into_iter().filter_map(to_rule).collect())
    }

    async fn create(
        &self,
        pattern: &str,
        rule_type: RuleType,
        description: Option<String>,
    ) -> Result<PolicyRule, RepositoryError> {
        let model = policy_rule::ActiveModel {
            id: Set(Uuid::new_v4()),
            pattern: Set(pattern.trim().to_lowercase()),
            rule_type: Set(rule_type.to_string()),
            is_active: Set(true),
            description: Set(description),
            created_at: Set(Utc::now().into()),
        };
        let inserted = model.insert(self.db.as_ref()).await?;

        to_rule(inserted).ok_or(RepositoryError::NotFound)
    }
}
