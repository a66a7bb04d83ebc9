// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::audit_log::AuditStage;
use crate::domain::repositories::storage_repository::StorageError;
use crate::domain::repositories::work_item_repository::RepositoryError;
use crate::domain::services::policy_engine::PolicyError;
use std::fmt;
use thiserror::Error;

/// Worker错误类型
///
/// 周期本身的错误（选取事务失败、策略加载失败等），
/// 单个工作项的失败不会以此形式向上传播。
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("仓库错误: {0}")]
    Repository(#[from] RepositoryError),

    #[error("策略错误: {0}")]
    Policy(#[from] PolicyError),

    #[error("存储错误: {0}")]
    Storage(#[from] StorageError),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 流水线失败分类
///
/// 每一类失败对应一个审计阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// 被策略拦截（终态，不是错误）
    PolicyBlocked,
    /// 抓取失败，包括内容过短
    FetchFailure,
    /// 分类超时
    AnalyzerTimeout,
    /// 分类器没有返回结果
    AnalyzerEmptyResult,
    /// 重复提交的域名
    DuplicateDomain,
    /// 进程崩溃或卡住后遗留在活跃状态
    OrphanedActiveState,
}

impl FailureKind {
    /// 对应的审计阶段
    pub fn stage(self) -> AuditStage {
        match self {
            FailureKind::PolicyBlocked => AuditStage::Policy,
            FailureKind::FetchFailure => AuditStage::Crawler,
            FailureKind::AnalyzerTimeout => AuditStage::AnalyzerTimeout,
            FailureKind::AnalyzerEmptyResult => AuditStage::Analyzer,
            FailureKind::DuplicateDomain => AuditStage::Ingest,
            FailureKind::OrphanedActiveState => AuditStage::Recovery,
        }
    }

    /// 指标标签
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::PolicyBlocked => "policy_blocked",
            FailureKind::FetchFailure => "fetch_failure",
            FailureKind::AnalyzerTimeout => "analyzer_timeout",
            FailureKind::AnalyzerEmptyResult => "analyzer_empty_result",
            FailureKind::DuplicateDomain => "duplicate_domain",
            FailureKind::OrphanedActiveState => "orphaned_active_state",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
