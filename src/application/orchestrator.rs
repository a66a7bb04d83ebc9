// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::application::health::{HealthReporter, HealthSummary, HealthThresholds};
use crate::config::settings::Settings;
use crate::domain::models::audit_log::{AuditLogEntry, AuditStage, NewAuditEntry};
use crate::domain::models::work_item::{DomainError, WorkItem, WorkItemStatus};
use crate::domain::repositories::audit_log_repository::AuditLogRepository;
use crate::domain::repositories::category_repository::CategoryRepository;
use crate::domain::repositories::storage_repository::ContentStore;
use crate::domain::repositories::work_item_repository::{
    ReclassifySummary, RecoveredItem, RepositoryError, WorkItemRepository,
};
use crate::domain::services::policy_engine::{PolicyEngine, PolicyError};
use crate::engines::traits::{Analyzer, Crawler, KnowledgeStore};
use crate::queue::scheduler::PipelineScheduler;
use crate::utils::errors::WorkerError;
use crate::utils::url_utils::normalize_domain;
use crate::workers::analysis_cycle::{AnalysisCycle, AnalysisCycleConfig, AnalysisDeps};
use crate::workers::clock::{Cycle, CycleClock};
use crate::workers::crawl_cycle::{CrawlCycle, CrawlCycleConfig};
use crate::workers::recovery_monitor::RecoveryMonitor;
use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// 卡住工作项的最大样本数
const BOTTLENECK_SAMPLES: u64 = 10;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error(transparent)]
    InvalidDomain(#[from] DomainError),

    #[error("Domain not found: {0}")]
    NotFound(String),

    #[error("Domain {domain} is {status}, only COMPLETED items can be archived")]
    NotArchivable {
        domain: String,
        status: WorkItemStatus,
    },
}

/// 编排器依赖的协作方
pub struct PipelineComponents {
    pub items: Arc<dyn WorkItemRepository>,
    pub audit: Arc<dyn AuditLogRepository>,
    pub categories: Arc<dyn CategoryRepository>,
    pub policy: Arc<PolicyEngine>,
    pub content: Arc<dyn ContentStore>,
    pub crawler: Arc<dyn Crawler>,
    pub analyzer: Arc<dyn Analyzer>,
    pub knowledge: Arc<dyn KnowledgeStore>,
}

/// 提交结果
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// 新建的工作项
    Created(WorkItem),
    /// 域名已存在，返回已有的工作项
    Duplicate(WorkItem),
}

impl SubmitOutcome {
    pub fn item(&self) -> &WorkItem {
        match self {
            SubmitOutcome::Created(item) | SubmitOutcome::Duplicate(item) => item,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, SubmitOutcome::Duplicate(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSizes {
    pub crawl: u64,
    pub analysis: u64,
}

/// 运行状态
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub running: bool,
    pub uptime_seconds: i64,
    pub last_crawl_run_at: Option<DateTime<Utc>>,
    pub last_analysis_run_at: Option<DateTime<Utc>>,
    pub batch_sizes: BatchSizes,
}

/// 流水线统计
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    pub total: u64,
    pub by_status: BTreeMap<WorkItemStatus, u64>,
}

impl PipelineStats {
    pub fn count(&self, status: WorkItemStatus) -> u64 {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

/// 卡住的工作项
#[derive(Debug, Clone, Serialize)]
pub struct StuckItem {
    pub domain: String,
    pub status: WorkItemStatus,
    pub updated_at: DateTime<FixedOffset>,
    pub retry_count: i32,
}

/// 瓶颈报告
#[derive(Debug, Clone, Serialize)]
pub struct BottleneckReport {
    pub threshold_seconds: u64,
    pub stuck_crawling: u64,
    pub stuck_analyzing: u64,
    pub samples: Vec<StuckItem>,
}

/// 流水线编排器
///
/// 进程启动时创建一次，持有所有共享组件并对外提供管理操作。
pub struct Orchestrator {
    items: Arc<dyn WorkItemRepository>,
    audit: Arc<dyn AuditLogRepository>,
    policy: Arc<PolicyEngine>,
    clock: Arc<CycleClock>,
    recovery: Arc<RecoveryMonitor>,
    health: HealthReporter,
    scheduler: PipelineScheduler,
    batch_sizes: BatchSizes,
    recover_on_startup: bool,
    running: AtomicBool,
}

impl Orchestrator {
    /// 创建编排器并注册三个周期任务
    ///
    /// # 参数
    ///
    /// * `components` - 协作方
    /// * `settings` - 应用配置
    pub fn new(components: PipelineComponents, settings: &Settings) -> Self {
        let pipeline = &settings.pipeline;
        let recovery_settings = &settings.recovery;
        let clock = Arc::new(CycleClock::new());

        let crawl = Arc::new(CrawlCycle::new(
            components.items.clone(),
            components.policy.clone(),
            components.crawler,
            components.content.clone(),
            clock.clone(),
            CrawlCycleConfig {
                batch_size: pipeline.crawl_batch_size,
                min_content_length: pipeline.min_content_length,
                scheme: settings.crawler.scheme.clone(),
            },
        ));

        let analysis = Arc::new(AnalysisCycle::new(
            AnalysisDeps {
                items: components.items.clone(),
                audit: components.audit.clone(),
                categories: components.categories,
                content: components.content,
                analyzer: components.analyzer,
                knowledge: components.knowledge,
            },
            clock.clone(),
            AnalysisCycleConfig {
                batch_size: pipeline.analysis_batch_size,
                deadline: pipeline.analysis_timeout(),
                knowledge_deadline: settings.knowledge.timeout(),
            },
        ));

        let recovery = Arc::new(RecoveryMonitor::new(
            components.items.clone(),
            clock.clone(),
            recovery_settings.staleness_threshold(),
            recovery_settings.stall_threshold(),
        ));

        let max_runs = u32::try_from(pipeline.max_concurrent_runs).unwrap_or(u32::MAX);
        let scheduler = PipelineScheduler::new()
            .add_job(crawl, pipeline.crawl_interval(), max_runs)
            .add_job(analysis, pipeline.analysis_interval(), max_runs)
            .add_job(recovery.clone(), recovery_settings.sweep_interval(), 1);

        let health = HealthReporter::new(
            clock.clone(),
            components.items.clone(),
            HealthThresholds {
                crawl_degraded: Duration::from_secs(recovery_settings.crawl_degraded_secs),
                analysis_degraded: Duration::from_secs(recovery_settings.analysis_degraded_secs),
                recovery_degraded: recovery_settings.sweep_interval() * 2,
            },
        );

        Self {
            items: components.items,
            audit: components.audit,
            policy: components.policy,
            clock,
            recovery,
            health,
            scheduler,
            batch_sizes: BatchSizes {
                crawl: pipeline.crawl_batch_size,
                analysis: pipeline.analysis_batch_size,
            },
            recover_on_startup: recovery_settings.recover_on_startup,
            running: AtomicBool::new(false),
        }
    }

    /// 启动流水线
    ///
    /// 先执行启动恢复，再加载策略，最后启动调度器。
    ///
    /// # 返回值
    ///
    /// * `Ok(Vec<RecoveredItem>)` - 启动恢复回退的工作项
    /// * `Err(OrchestratorError)` - 启动恢复失败
    pub async fn start(&self) -> Result<Vec<RecoveredItem>, OrchestratorError> {
        if self.is_running() {
            return Ok(Vec::new());
        }

        let recovered = if self.recover_on_startup {
            self.recovery.startup_sweep().await?
        } else {
            Vec::new()
        };

        if let Err(e) = self.policy.reload().await {
            // 抓取周期会在下次触发时重试加载
            warn!(error = %e, "Initial policy load failed");
        }

        self.scheduler.start();
        self.running.store(true, Ordering::SeqCst);
        info!(recovered = recovered.len(), "Orchestrator started");
        Ok(recovered)
    }

    /// 停止流水线，等待进行中的周期结束
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.scheduler.stop().await;
        info!("Orchestrator stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn scheduler(&self) -> &PipelineScheduler {
        &self.scheduler
    }

    pub fn clock(&self) -> Arc<CycleClock> {
        self.clock.clone()
    }

    /// 当前运行状态
    pub fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            running: self.is_running(),
            uptime_seconds: (Utc::now() - self.clock.started_at()).num_seconds(),
            last_crawl_run_at: self.clock.last_run_at(Cycle::Crawl),
            last_analysis_run_at: self.clock.last_run_at(Cycle::Analysis),
            batch_sizes: self.batch_sizes.clone(),
        }
    }

    /// 组件健康汇总
    pub async fn health(&self) -> HealthSummary {
        self.health.report(self.is_running()).await
    }

    /// 将所有可重试的失败工作项放回流水线
    ///
    /// 幂等：没有新的失败时重复调用不产生任何变化。
    pub async fn reclassify_failures(&self) -> Result<ReclassifySummary, OrchestratorError> {
        let summary = self.items.reclassify_failures().await?;
        info!(
            crawl_failures_requeued = summary.crawl_failures_requeued,
            analysis_failures_reanalyzed = summary.analysis_failures_reanalyzed,
            analysis_failures_requeued = summary.analysis_failures_requeued,
            "Failures reclassified"
        );
        Ok(summary)
    }

    /// 提交域名
    ///
    /// # 参数
    ///
    /// * `domain` - 域名，会被规范化为小写主机名
    /// * `source` - 来源标记
    /// * `priority` - 优先级，数值越小越优先
    ///
    /// # 返回值
    ///
    /// * `Ok(SubmitOutcome)` - 新建或已存在
    /// * `Err(OrchestratorError)` - 域名无效或数据库错误
    pub async fn submit(
        &self,
        domain: &str,
        source: &str,
        priority: i32,
    ) -> Result<SubmitOutcome, OrchestratorError> {
        let domain = normalize_domain(domain)?;
        let item = WorkItem::new(domain.clone(), source.to_string(), priority);

        let audit = NewAuditEntry::info(
            item.id,
            AuditStage::Ingest,
            format!("Submitted by {} with priority {}", source, priority),
        );

        match self.items.submit(&item, audit).await? {
            Some(created) => {
                info!(domain = %created.domain, source, priority, "Domain submitted");
                Ok(SubmitOutcome::Created(created))
            }
            None => {
                let existing = self
                    .items
                    .find_by_domain(&domain)
                    .await?
                    .ok_or_else(|| OrchestratorError::NotFound(domain.clone()))?;
                info!(domain = %domain, status = %existing.status, "Domain already tracked");
                Ok(SubmitOutcome::Duplicate(existing))
            }
        }
    }

    /// 归档已完成的工作项
    pub async fn archive(&self, domain: &str) -> Result<WorkItem, OrchestratorError> {
        let domain = normalize_domain(domain)?;
        let item = self
            .items
            .find_by_domain(&domain)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(domain.clone()))?;

        let archived = match item.status {
            WorkItemStatus::Completed => self.items.archive(item.id).await?,
            _ => false,
        };
        if !archived {
            return Err(OrchestratorError::NotArchivable {
                domain,
                status: item.status,
            });
        }

        let archived = self
            .items
            .find_by_id(item.id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(domain.clone()))?;
        info!(domain = %domain, "Work item archived");
        Ok(archived)
    }

    /// 重新加载策略快照
    pub async fn reload_policies(&self) -> Result<(usize, usize), OrchestratorError> {
        let snapshot = self.policy.reload().await?;
        Ok((snapshot.allow_count(), snapshot.deny_count()))
    }

    /// 按状态统计
    pub async fn pipeline_stats(&self) -> Result<PipelineStats, OrchestratorError> {
        let by_status = self.items.count_by_status().await?;
        Ok(PipelineStats {
            total: by_status.values().sum(),
            by_status,
        })
    }

    /// 在活跃状态停留超过 `threshold` 的工作项
    pub async fn bottlenecks(
        &self,
        threshold: Duration,
    ) -> Result<BottleneckReport, OrchestratorError> {
        let threshold_delta = chrono::Duration::from_std(threshold)
            .map_err(|e| WorkerError::Internal(e.to_string()))?;
        let before: DateTime<FixedOffset> = (Utc::now() - threshold_delta).into();

        let stuck_crawling = self
            .items
            .count_stuck(WorkItemStatus::Crawling, before)
            .await?;
        let stuck_analyzing = self
            .items
            .count_stuck(WorkItemStatus::Analyzing, before)
            .await?;
        let samples = self
            .items
            .find_stuck(before, BOTTLENECK_SAMPLES)
            .await?
            .into_iter()
            .map(|item| StuckItem {
                domain: item.domain,
                status: item.status,
                updated_at: item.updated_at,
                retry_count: item.retry_count,
            })
            .collect();

        Ok(BottleneckReport {
            threshold_seconds: threshold.as_secs(),
            stuck_crawling,
            stuck_analyzing,
            samples,
        })
    }

    /// 最近的审计记录，最新的在前
    pub async fn recent_logs(&self, limit: u64) -> Result<Vec<AuditLogEntry>, OrchestratorError> {
        Ok(self.audit.recent(limit).await?)
    }
}
