// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 审计阶段
///
/// 每种失败类型写入各自的阶段，分类器超时与分类器无结果使用不同阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStage {
    /// 工作项录入
    Ingest,
    /// 域名策略
    Policy,
    /// 抓取
    Crawler,
    /// 分类
    Analyzer,
    /// 分类超时
    AnalyzerTimeout,
    /// 知识库索引
    Knowledge,
    /// 崩溃恢复与卡住修复
    Recovery,
    /// 运维操作
    Operator,
}

impl AuditStage {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditStage::Ingest => "INGEST",
            AuditStage::Policy => "POLICY",
            AuditStage::Crawler => "CRAWLER",
            AuditStage::Analyzer => "ANALYZER",
            AuditStage::AnalyzerTimeout => "ANALYZER_TIMEOUT",
            AuditStage::Knowledge => "KNOWLEDGE",
            AuditStage::Recovery => "RECOVERY",
            AuditStage::Operator => "OPERATOR",
        }
    }
}

impl fmt::Display for AuditStage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 审计级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditLevel {
    Info,
    Warning,
    Error,
}

impl AuditLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditLevel::Info => "INFO",
            AuditLevel::Warning => "WARNING",
            AuditLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for AuditLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 待写入的审计记录
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub item_id: Option<Uuid>,
    pub stage: AuditStage,
    pub level: AuditLevel,
    pub message: String,
}

impl NewAuditEntry {
    pub fn new(
        item_id: Option<Uuid>,
        stage: AuditStage,
        level: AuditLevel,
        message: impl Into<String>,
    ) -> Self {
        Self {
            item_id,
            stage,
            level,
            message: message.into(),
        }
    }

    pub fn info(item_id: Uuid, stage: AuditStage, message: impl Into<String>) -> Self {
        Self::new(Some(item_id), stage, AuditLevel::Info, message)
    }

    pub fn warning(item_id: Uuid, stage: AuditStage, message: impl Into<String>) -> Self {
        Self::new(Some(item_id), stage, AuditLevel::Warning, message)
    }

    pub fn error(item_id: Uuid, stage: AuditStage, message: impl Into<String>) -> Self {
        Self::new(Some(item_id), stage, AuditLevel::Error, message)
    }
}

/// 审计日志记录（只追加，永不修改）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: i32,
    pub item_id: Option<Uuid>,
    /// 阶段，存储为字符串以兼容历史数据
    pub stage: String,
    pub level: String,
    pub message: String,
    pub created_at: DateTime<FixedOffset>,
}
