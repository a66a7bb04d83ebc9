// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::audit_log::NewAuditEntry;
use crate::domain::models::classification::{Classification, ClassificationResult};
use crate::domain::models::fetch_result::{CrawlOutcome, FetchResult};
use crate::domain::models::work_item::{DomainError, WorkItem, WorkItemStatus};
use crate::domain::services::policy_engine::PolicySnapshot;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use sea_orm::DbErr;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

/// 仓库错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    /// 记录未找到
    #[error("Record not found")]
    NotFound,
    /// 状态转换不合法
    #[error(transparent)]
    InvalidTransition(#[from] DomainError),
    /// 存储的记录无法还原为领域模型
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),
}

/// 抓取批次认领结果
///
/// 选取、策略拦截与认领在同一个事务中完成。
#[derive(Debug, Default)]
pub struct CrawlClaim {
    /// 已认领进入 CRAWLING 的工作项
    pub claimed: Vec<WorkItem>,
    /// 被策略拦截进入 BLOCKED 的工作项
    pub blocked: Vec<WorkItem>,
}

/// 被恢复监控回退的工作项
#[derive(Debug, Clone)]
pub struct RecoveredItem {
    pub id: Uuid,
    pub domain: String,
    pub from: WorkItemStatus,
    pub to: WorkItemStatus,
}

/// 失败重分类汇总
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReclassifySummary {
    /// CRAWLED_FAIL → QUEUED
    pub crawl_failures_requeued: u64,
    /// ANALYSIS_FAIL → CRAWLED_OK（已有抓取内容）
    pub analysis_failures_reanalyzed: u64,
    /// ANALYSIS_FAIL → QUEUED（没有可用的抓取内容）
    pub analysis_failures_requeued: u64,
}

impl ReclassifySummary {
    pub fn total(&self) -> u64 {
        self.crawl_failures_requeued
            + self.analysis_failures_reanalyzed
            + self.analysis_failures_requeued
    }
}

/// 工作项仓库特质
///
/// 所有状态变更都以"比较并设置"的方式写入：只有当工作项仍处于
/// 预期状态时更新才生效，返回值表示写入是否生效。
///
/// 完成类写入以认领时拿到的工作项为凭据：状态和重试次数都必须
/// 与认领时一致。回退和重试都会增加重试次数，因此回退之后
/// 即使同一工作项被再次认领，旧认领的结果也不会被写入。
#[async_trait]
pub trait WorkItemRepository: Send + Sync {
    /// 插入新工作项，域名已存在时返回None
    async fn create_if_absent(&self, item: &WorkItem) -> Result<Option<WorkItem>, RepositoryError>;
    /// 插入新工作项并在同一事务中写入审计记录，域名已存在时返回None且不写审计
    async fn submit(
        &self,
        item: &WorkItem,
        audit: NewAuditEntry,
    ) -> Result<Option<WorkItem>, RepositoryError>;
    /// 根据ID查找工作项
    async fn find_by_id(&self, id: Uuid) -> Result<Option<WorkItem>, RepositoryError>;
    /// 根据域名查找工作项
    async fn find_by_domain(&self, domain: &str) -> Result<Option<WorkItem>, RepositoryError>;
    /// 选取并认领一批待抓取的工作项，策略拦截的直接进入 BLOCKED
    async fn claim_crawl_batch(
        &self,
        limit: u64,
        policy: &PolicySnapshot,
    ) -> Result<CrawlClaim, RepositoryError>;
    /// 选取并认领一批待分析的工作项
    async fn claim_analysis_batch(&self, limit: u64) -> Result<Vec<WorkItem>, RepositoryError>;
    /// 写入抓取结局（状态 + 抓取结果 + 审计记录）
    ///
    /// `claimed` 是认领时返回的工作项
    async fn record_crawl_outcome(
        &self,
        claimed: &WorkItem,
        outcome: &CrawlOutcome,
    ) -> Result<bool, RepositoryError>;
    /// 写入分类结果并标记完成
    async fn complete_analysis(
        &self,
        claimed: &WorkItem,
        classification: &Classification,
    ) -> Result<bool, RepositoryError>;
    /// 标记分析失败并写入审计记录
    async fn fail_analysis(
        &self,
        claimed: &WorkItem,
        audit: NewAuditEntry,
    ) -> Result<bool, RepositoryError>;
    /// 查找抓取结果
    async fn find_fetch_result(&self, id: Uuid) -> Result<Option<FetchResult>, RepositoryError>;
    /// 查找分类结果
    async fn find_classification(
        &self,
        id: Uuid,
    ) -> Result<Option<ClassificationResult>, RepositoryError>;
    /// 回退处于活跃状态的工作项
    ///
    /// `stale_before` 为空时回退全部活跃工作项（启动恢复），
    /// 否则只回退最后更新时间早于该时刻的工作项。
    async fn roll_back_active(
        &self,
        stale_before: Option<DateTime<FixedOffset>>,
    ) -> Result<Vec<RecoveredItem>, RepositoryError>;
    /// 将所有可重试的失败工作项重新放回流水线
    async fn reclassify_failures(&self) -> Result<ReclassifySummary, RepositoryError>;
    /// 归档已完成的工作项
    async fn archive(&self, id: Uuid) -> Result<bool, RepositoryError>;
    /// 按状态统计工作项数量
    async fn count_by_status(&self) -> Result<BTreeMap<WorkItemStatus, u64>, RepositoryError>;
    /// 查找在活跃状态停留过久的工作项
    async fn find_stuck(
        &self,
        updated_before: DateTime<FixedOffset>,
        limit: u64,
    ) -> Result<Vec<WorkItem>, RepositoryError>;
    /// 统计在指定活跃状态停留过久的工作项
    async fn count_stuck(
        &self,
        status: WorkItemStatus,
        updated_before: DateTime<FixedOffset>,
    ) -> Result<u64, RepositoryError>;
    /// 检查数据库连接
    async fn ping(&self) -> Result<(), RepositoryError>;
}
