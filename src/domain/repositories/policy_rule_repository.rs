// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::policy_rule::{PolicyRule, RuleType};
use crate::domain::repositories::work_item_repository::RepositoryError;
use async_trait::async_trait;

/// 策略规则仓库特质
#[async_trait]
pub trait PolicyRuleRepository: Send + Sync {
    /// 查找全部启用的规则
    async fn find_active(&self) -> Result<Vec<PolicyRule>, RepositoryError>;
    /// 新增规则
    async fn create(
        &self,
        pattern: &str,
        rule_type: RuleType,
        description: Option<String>,
    ) -> Result<PolicyRule, RepositoryError>;
}
