// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// 分类器返回的分类结论
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// 主分类
    #[serde(alias = "category_main")]
    pub category: String,
    /// 是否恶意
    #[serde(alias = "is_malicious")]
    pub malicious: bool,
    /// 置信度 (0.0 - 1.0)
    #[serde(alias = "confidence_score", default)]
    pub confidence: f64,
    /// 摘要
    #[serde(default)]
    pub summary: String,
    /// 使用的模型
    #[serde(alias = "llm_model_used", default = "unknown_model")]
    pub model: String,
}

fn unknown_model() -> String {
    "unknown".to_string()
}

/// 已持久化的分类结果
///
/// 每个工作项至多一条，重新分析时覆盖。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// 所属工作项ID
    pub item_id: Uuid,
    /// 分类结论
    pub classification: Classification,
    /// 分析时间
    pub analyzed_at: DateTime<FixedOffset>,
}

/// 分类提示：分类名称 → 描述
pub type CategoryHints = BTreeMap<String, String>;
