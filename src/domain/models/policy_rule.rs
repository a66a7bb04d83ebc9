// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 策略规则类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
    /// 放行，优先于拦截
    Allow,
    /// 拦截
    Deny,
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RuleType::Allow => write!(f, "ALLOW"),
            RuleType::Deny => write!(f, "DENY"),
        }
    }
}

impl FromStr for RuleType {
    type Err = ();

    /// 兼容旧的 WHITELIST/BLACKLIST 写法
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ALLOW" | "WHITELIST" => Ok(RuleType::Allow),
            "DENY" | "BLACKLIST" => Ok(RuleType::Deny),
            _ => Err(()),
        }
    }
}

/// 域名策略规则
///
/// 只由外部管理面修改，流水线只读。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: Uuid,
    /// 匹配模式，例如 example.com 或 *.example.com
    pub pattern: String,
    pub rule_type: RuleType,
    pub is_active: bool,
    pub description: Option<String>,
    pub created_at: DateTime<FixedOffset>,
}
