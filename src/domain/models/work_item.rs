// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// 默认优先级，数值越小越紧急
pub const DEFAULT_PRIORITY: i32 = 3;

/// 默认来源标记
pub const DEFAULT_SOURCE: &str = "manual";

/// 工作项实体
///
/// 流水线中的最小工作单元，以域名唯一标识。工作项从
/// DISCOVERED 开始，经过抓取、分析阶段，最终进入终态或
/// 可重试的失败状态。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    /// 工作项唯一标识符
    pub id: Uuid,
    /// 域名（小写，全局唯一）
    pub domain: String,
    /// 当前状态，只能沿状态转换表变化
    pub status: WorkItemStatus,
    /// 优先级，数值越小优先级越高
    pub priority: i32,
    /// 来源标记，例如 manual 或某个情报源名称
    pub source: String,
    /// 重试次数，单调不减
    pub retry_count: i32,
    /// 创建时间
    pub created_at: DateTime<FixedOffset>,
    /// 最后更新时间，恢复监控以此判断是否卡住
    pub updated_at: DateTime<FixedOffset>,
    /// 完成时间
    pub completed_at: Option<DateTime<FixedOffset>>,
}

/// 工作项状态枚举
///
/// 状态转换遵循以下流程：
/// DISCOVERED → CRAWLING → CRAWLED_OK → ANALYZING → COMPLETED → ARCHIVED
///
/// 其余分支见 [`WorkItemStatus::can_transition_to`]。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkItemStatus {
    /// 已发现，等待抓取
    #[default]
    Discovered,
    /// 被域名策略拦截（终态）
    Blocked,
    /// 运维重试后重新排队，等待抓取
    Queued,
    /// 抓取中（活跃状态）
    Crawling,
    /// 抓取成功，等待分析
    CrawledOk,
    /// 抓取失败（可重试）
    CrawledFail,
    /// 分析中（活跃状态）
    Analyzing,
    /// 已完成
    Completed,
    /// 分析失败（可重试）
    AnalysisFail,
    /// 已归档（终态）
    Archived,
}

impl WorkItemStatus {
    /// 全部状态
    pub const ALL: [WorkItemStatus; 10] = [
        WorkItemStatus::Discovered,
        WorkItemStatus::Blocked,
        WorkItemStatus::Queued,
        WorkItemStatus::Crawling,
        WorkItemStatus::CrawledOk,
        WorkItemStatus::CrawledFail,
        WorkItemStatus::Analyzing,
        WorkItemStatus::Completed,
        WorkItemStatus::AnalysisFail,
        WorkItemStatus::Archived,
    ];

    /// 抓取周期可以选取的状态
    pub const CRAWL_READY: [WorkItemStatus; 2] = [WorkItemStatus::Discovered, WorkItemStatus::Queued];

    /// 判断状态转换是否合法
    ///
    /// 任何未在表中列出的转换都会被拒绝。
    ///
    /// # 参数
    ///
    /// * `next` - 目标状态
    ///
    /// # 返回值
    ///
    /// 合法返回true，否则返回false
    pub fn can_transition_to(self, next: WorkItemStatus) -> bool {
        use WorkItemStatus::*;

        matches!(
            (self, next),
            (Discovered, Blocked)
                | (Discovered, Crawling)
                | (Queued, Blocked)
                | (Queued, Crawling)
                | (Crawling, CrawledOk)
                | (Crawling, CrawledFail)
                | (Crawling, Discovered)
                | (CrawledFail, Queued)
                | (CrawledOk, Analyzing)
                | (Analyzing, Completed)
                | (Analyzing, AnalysisFail)
                | (Analyzing, CrawledOk)
                | (AnalysisFail, Queued)
                | (AnalysisFail, CrawledOk)
                | (Completed, Archived)
        )
    }

    /// 是否为活跃状态（已被某个周期认领）
    pub fn is_active(self) -> bool {
        matches!(self, WorkItemStatus::Crawling | WorkItemStatus::Analyzing)
    }

    /// 是否为可重试的失败状态
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            WorkItemStatus::CrawledFail | WorkItemStatus::AnalysisFail
        )
    }

    /// 是否为终态
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkItemStatus::Completed | WorkItemStatus::Archived | WorkItemStatus::Blocked
        )
    }

    /// 活跃状态回退一个阶段后的状态
    ///
    /// 用于崩溃恢复：CRAWLING → DISCOVERED，ANALYZING → CRAWLED_OK。
    /// 非活跃状态返回None。
    pub fn rollback_target(self) -> Option<WorkItemStatus> {
        match self {
            WorkItemStatus::Crawling => Some(WorkItemStatus::Discovered),
            WorkItemStatus::Analyzing => Some(WorkItemStatus::CrawledOk),
            _ => None,
        }
    }

    /// 数据库中存储的字符串形式
    pub fn as_str(self) -> &'static str {
        match self {
            WorkItemStatus::Discovered => "DISCOVERED",
            WorkItemStatus::Blocked => "BLOCKED",
            WorkItemStatus::Queued => "QUEUED",
            WorkItemStatus::Crawling => "CRAWLING",
            WorkItemStatus::CrawledOk => "CRAWLED_OK",
            WorkItemStatus::CrawledFail => "CRAWLED_FAIL",
            WorkItemStatus::Analyzing => "ANALYZING",
            WorkItemStatus::Completed => "COMPLETED",
            WorkItemStatus::AnalysisFail => "ANALYSIS_FAIL",
            WorkItemStatus::Archived => "ARCHIVED",
        }
    }
}

impl fmt::Display for WorkItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkItemStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkItemStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::UnknownStatus(s.to_string()))
    }
}

/// 领域错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 无效的状态转换
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition {
        from: WorkItemStatus,
        to: WorkItemStatus,
    },

    /// 无法识别的状态字符串
    #[error("Unknown status: {0}")]
    UnknownStatus(String),

    /// 无效的域名
    #[error("Invalid domain: {0}")]
    InvalidDomain(String),
}

impl WorkItem {
    /// 创建一个新的工作项，初始状态为 DISCOVERED
    ///
    /// # 参数
    ///
    /// * `domain` - 已规范化的域名
    /// * `source` - 来源标记
    /// * `priority` - 优先级
    pub fn new(domain: String, source: String, priority: i32) -> Self {
        let now: DateTime<FixedOffset> = Utc::now().into();
        Self {
            id: Uuid::new_v4(),
            domain,
            status: WorkItemStatus::Discovered,
            priority,
            source,
            retry_count: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// 按状态转换表转换状态
    ///
    /// # 参数
    ///
    /// * `next` - 目标状态
    ///
    /// # 返回值
    ///
    /// * `Ok(WorkItem)` - 转换后的工作项
    /// * `Err(DomainError)` - 转换不在表中
    pub fn transition(mut self, next: WorkItemStatus) -> Result<Self, DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status,
                to: next,
            });
        }

        let now: DateTime<FixedOffset> = Utc::now().into();
        self.status = next;
        self.updated_at = now;
        if next == WorkItemStatus::Completed {
            self.completed_at = Some(now);
        }
        Ok(self)
    }
}

#[cfg(test)]
#[path = "work_item_test.rs"]
mod tests;
