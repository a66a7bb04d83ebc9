// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::audit_log::{AuditStage, NewAuditEntry};
use crate::domain::models::classification::{CategoryHints, Classification};
use crate::domain::models::work_item::WorkItem;
use crate::domain::repositories::audit_log_repository::AuditLogRepository;
use crate::domain::repositories::category_repository::CategoryRepository;
use crate::domain::repositories::storage_repository::ContentStore;
use crate::domain::repositories::work_item_repository::WorkItemRepository;
use crate::engines::traits::{Analyzer, KnowledgeStore};
use crate::utils::errors::{FailureKind, WorkerError};
use crate::workers::clock::{Cycle, CycleClock};
use crate::workers::worker::Worker;
use async_trait::async_trait;
use futures::future::join_all;
use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

/// 送入知识库的证据长度（字符）
const EVIDENCE_CHARS: usize = 1000;

/// 分析周期配置
#[derive(Debug, Clone)]
pub struct AnalysisCycleConfig {
    /// 每次最多认领的工作项数
    pub batch_size: u64,
    /// 单个工作项的分析截止时间
    pub deadline: Duration,
    /// 知识库写入的截止时间
    pub knowledge_deadline: Duration,
}

/// 单次分析周期的统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AnalysisReport {
    pub claimed: usize,
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub discarded: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemResult {
    Completed,
    Failed,
    TimedOut,
    Discarded,
}

/// 分析周期依赖的协作方
pub struct AnalysisDeps {
    pub items: Arc<dyn WorkItemRepository>,
    pub audit: Arc<dyn AuditLogRepository>,
    pub categories: Arc<dyn CategoryRepository>,
    pub content: Arc<dyn ContentStore>,
    pub analyzer: Arc<dyn Analyzer>,
    pub knowledge: Arc<dyn KnowledgeStore>,
}

#[derive(Clone)]
struct AnalysisContext {
    items: Arc<dyn WorkItemRepository>,
    audit: Arc<dyn AuditLogRepository>,
    content: Arc<dyn ContentStore>,
    analyzer: Arc<dyn Analyzer>,
    knowledge: Arc<dyn KnowledgeStore>,
    deadline: Duration,
    knowledge_deadline: Duration,
}

/// 分析周期
///
/// 选取 CRAWLED_OK 工作项并认领为 ANALYZING，读取抓取内容后在截止时间内
/// 调用分类器。成功的结论写入后再尽力写入知识库。
pub struct AnalysisCycle {
    ctx: AnalysisContext,
    categories: Arc<dyn CategoryRepository>,
    clock: Arc<CycleClock>,
    batch_size: u64,
}

/// 知识库文本：摘要加上内容开头作为证据
pub fn knowledge_text(summary: &str, content: &str) -> String {
    let evidence: String = content.chars().take(EVIDENCE_CHARS).collect();
    format!("Summary: {}\n\nEvidence: {}", summary, evidence)
}

impl AnalysisCycle {
    pub fn new(deps: AnalysisDeps, clock: Arc<CycleClock>, config: AnalysisCycleConfig) -> Self {
        Self {
            ctx: AnalysisContext {
                items: deps.items,
                audit: deps.audit,
                content: deps.content,
                analyzer: deps.analyzer,
                knowledge: deps.knowledge,
                deadline: config.deadline,
                knowledge_deadline: config.knowledge_deadline,
            },
            categories: deps.categories,
            clock,
            batch_size: config.batch_size,
        }
    }

    /// 执行一次分析周期
    ///
    /// # 返回值
    ///
    /// * `Ok(AnalysisReport)` - 本次周期的统计
    /// * `Err(WorkerError)` - 选取事务失败，下次触发时重试
    pub async fn run_cycle(&self) -> Result<AnalysisReport, WorkerError> {
        self.clock.record(Cycle::Analysis);

        let claimed = self.ctx.items.claim_analysis_batch(self.batch_size).await?;
        let mut report = AnalysisReport {
            claimed: claimed.len(),
            ..Default::default()
        };
        if claimed.is_empty() {
            return Ok(report);
        }
        counter!("pipeline_items_claimed_total", "cycle" => "analysis")
            .increment(claimed.len() as u64);

        let hints = match self.categories.hints().await {
            Ok(hints) => Arc::new(hints),
            Err(e) => {
                warn!(error = %e, "Failed to load category hints, analyzing without them");
                Arc::new(CategoryHints::new())
            }
        };

        let handles: Vec<_> = claimed
            .iter()
            .cloned()
            .map(|item| {
                let ctx = self.ctx.clone();
                let hints = hints.clone();
                tokio::spawn(async move { process_item(&ctx, &item, &hints).await })
            })
            .collect();

        let results = join_all(handles).await;

        for (item, joined) in claimed.iter().zip(results) {
            let result = match joined {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    error!(item_id = %item.id, domain = %item.domain, error = %e, "Analysis task failed");
                    self.ctx
                        .fail(item, AuditStage::Analyzer, format!("Analysis task failed: {}", e))
                        .await
                }
                Err(join_err) => {
                    error!(item_id = %item.id, domain = %item.domain, error = %join_err, "Analysis task panicked");
                    self.ctx
                        .fail(
                            item,
                            AuditStage::Analyzer,
                            format!("Analysis task panicked: {}", join_err),
                        )
                        .await
                }
            };

            let outcome = match result {
                ItemResult::Completed => {
                    report.completed += 1;
                    "ok"
                }
                ItemResult::Failed => {
                    report.failed += 1;
                    "fail"
                }
                ItemResult::TimedOut => {
                    report.timed_out += 1;
                    "timeout"
                }
                ItemResult::Discarded => {
                    report.discarded += 1;
                    "discarded"
                }
            };
            counter!("pipeline_analysis_outcomes_total", "outcome" => outcome).increment(1);
        }

        Ok(report)
    }
}

impl AnalysisContext {
    /// 标记分析失败；认领已失效时返回 Discarded
    async fn fail(&self, item: &WorkItem, stage: AuditStage, message: String) -> ItemResult {
        let timed_out = stage == AuditStage::AnalyzerTimeout;
        let audit = NewAuditEntry::error(item.id, stage, message);
        match self.items.fail_analysis(item, audit).await {
            Ok(true) if timed_out => ItemResult::TimedOut,
            Ok(true) => ItemResult::Failed,
            Ok(false) => ItemResult::Discarded,
            Err(e) => {
                // 工作项留在 ANALYZING，由恢复监控回退
                error!(item_id = %item.id, error = %e, "Failed to record analysis failure");
                ItemResult::Failed
            }
        }
    }

    async fn load_content(&self, item: &WorkItem) -> Result<Option<String>, WorkerError> {
        let Some(location) = self
            .items
            .find_fetch_result(item.id)
            .await?
            .and_then(|fetch| fetch.content_location)
        else {
            return Ok(None);
        };

        match self.content.load(&location).await {
            Ok(content) => Ok(content.filter(|c| !c.trim().is_empty())),
            Err(e) => {
                warn!(location = %location, error = %e, "Failed to read stored content");
                Ok(None)
            }
        }
    }

    /// 尽力写入知识库，失败或超时只记审计
    async fn index(&self, item: &WorkItem, classification: &Classification, content: &str) {
        let text = knowledge_text(&classification.summary, content);
        let indexed = tokio::time::timeout(
            self.knowledge_deadline,
            self.knowledge.index(
                &item.domain,
                &text,
                &classification.category,
                classification.malicious,
            ),
        )
        .await;

        let message = match indexed {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("Knowledge index failed: {}", e)),
            Err(_) => Some(format!(
                "Knowledge index did not respond within {}s",
                self.knowledge_deadline.as_secs_f64()
            )),
        };

        if let Some(message) = message {
            warn!(reason = %message, "Knowledge index failed");
            counter!("pipeline_knowledge_index_failures_total").increment(1);
            let audit = NewAuditEntry::warning(item.id, AuditStage::Knowledge, message);
            if let Err(e) = self.audit.append(audit).await {
                error!(error = %e, "Failed to write knowledge audit entry");
            }
        }
    }
}

#[instrument(skip(ctx, item, hints), fields(item_id = %item.id, domain = %item.domain))]
async fn process_item(
    ctx: &AnalysisContext,
    item: &WorkItem,
    hints: &CategoryHints,
) -> Result<ItemResult, WorkerError> {
    let Some(content) = ctx.load_content(item).await? else {
        return Ok(ctx
            .fail(item, AuditStage::Analyzer, "No content found for analysis".to_string())
            .await);
    };

    let classified =
        tokio::time::timeout(ctx.deadline, ctx.analyzer.classify(&item.domain, &content, hints))
            .await;

    let classification = match classified {
        Err(_) => {
            warn!(kind = %FailureKind::AnalyzerTimeout, deadline_secs = ctx.deadline.as_secs(), "Analyzer exceeded deadline");
            return Ok(ctx
                .fail(
                    item,
                    AuditStage::AnalyzerTimeout,
                    format!(
                        "Analyzer did not respond within {}s",
                        ctx.deadline.as_secs_f64()
                    ),
                )
                .await);
        }
        Ok(Err(e)) => {
            return Ok(ctx
                .fail(item, AuditStage::Analyzer, format!("Analyzer error: {}", e))
                .await);
        }
        Ok(Ok(None)) => {
            debug!(kind = %FailureKind::AnalyzerEmptyResult, "Analyzer returned nothing");
            return Ok(ctx
                .fail(item, AuditStage::Analyzer, "Analyzer returned no data".to_string())
                .await);
        }
        Ok(Ok(Some(classification))) => classification,
    };

    if !ctx.items.complete_analysis(item, &classification).await? {
        warn!("Analysis claim was superseded before the analyzer finished, result discarded");
        return Ok(ItemResult::Discarded);
    }
    debug!(
        category = %classification.category,
        malicious = classification.malicious,
        "Analysis completed"
    );

    ctx.index(item, &classification, &content).await;
    Ok(ItemResult::Completed)
}

#[async_trait]
impl Worker for AnalysisCycle {
    async fn run(&self) -> Result<(), WorkerError> {
        let start = Instant::now();
        let report = self.run_cycle().await?;
        histogram!("pipeline_cycle_duration_seconds", "cycle" => "analysis")
            .record(start.elapsed().as_secs_f64());

        if report.claimed > 0 {
            info!(
                claimed = report.claimed,
                completed = report.completed,
                failed = report.failed,
                timed_out = report.timed_out,
                discarded = report.discarded,
                "Analysis cycle finished"
            );
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "analysis_cycle"
    }
}
