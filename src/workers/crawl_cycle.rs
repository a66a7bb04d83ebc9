// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::fetch_result::CrawlOutcome;
use crate::domain::models::work_item::WorkItem;
use crate::domain::repositories::storage_repository::ContentStore;
use crate::domain::repositories::work_item_repository::WorkItemRepository;
use crate::domain::services::policy_engine::PolicyEngine;
use crate::engines::traits::{Crawler, FetchResponse};
use crate::utils::errors::{FailureKind, WorkerError};
use crate::utils::url_utils::{content_key, crawl_url};
use crate::workers::clock::{Cycle, CycleClock};
use crate::workers::worker::Worker;
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// 抓取周期配置
#[derive(Debug, Clone)]
pub struct CrawlCycleConfig {
    /// 每次最多认领的工作项数
    pub batch_size: u64,
    /// 内容最小长度（字符）
    pub min_content_length: usize,
    /// 请求协议
    pub scheme: String,
}

/// 单次抓取周期的统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CrawlReport {
    pub claimed: usize,
    pub blocked: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// 完成时认领已失效（被恢复监控回退，可能已被再次认领），结果被丢弃
    pub discarded: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemResult {
    Succeeded,
    Failed,
    Discarded,
}

/// 单个工作项处理所需的共享依赖
#[derive(Clone)]
struct CrawlContext {
    items: Arc<dyn WorkItemRepository>,
    crawler: Arc<dyn Crawler>,
    content: Arc<dyn ContentStore>,
    min_content_length: usize,
    scheme: String,
}

/// 抓取周期
///
/// 选取 DISCOVERED/QUEUED 工作项，经策略判断后认领并并发抓取。
/// 每个工作项的结局在完成时单独提交。
pub struct CrawlCycle {
    ctx: CrawlContext,
    policy: Arc<PolicyEngine>,
    clock: Arc<CycleClock>,
    batch_size: u64,
}

impl CrawlCycle {
    /// 创建抓取周期
    ///
    /// # 参数
    ///
    /// * `items` - 工作项仓库
    /// * `policy` - 策略引擎
    /// * `crawler` - 抓取器
    /// * `content` - 内容存储
    /// * `clock` - 周期运行时钟
    /// * `config` - 周期配置
    pub fn new(
        items: Arc<dyn WorkItemRepository>,
        policy: Arc<PolicyEngine>,
        crawler: Arc<dyn Crawler>,
        content: Arc<dyn ContentStore>,
        clock: Arc<CycleClock>,
        config: CrawlCycleConfig,
    ) -> Self {
        Self {
            ctx: CrawlContext {
                items,
                crawler,
                content,
                min_content_length: config.min_content_length,
                scheme: config.scheme,
            },
            policy,
            clock,
            batch_size: config.batch_size,
        }
    }

    /// 执行一次抓取周期
    ///
    /// # 返回值
    ///
    /// * `Ok(CrawlReport)` - 本次周期的统计
    /// * `Err(WorkerError)` - 策略加载或选取事务失败，下次触发时重试
    pub async fn run_cycle(&self) -> Result<CrawlReport, WorkerError> {
        self.clock.record(Cycle::Crawl);

        let policy = self.policy.ensure_loaded().await?;
        let claim = self
            .ctx
            .items
            .claim_crawl_batch(self.batch_size, &policy)
            .await?;

        let mut report = CrawlReport {
            claimed: claim.claimed.len(),
            blocked: claim.blocked.len(),
            ..Default::default()
        };
        counter!("pipeline_items_blocked_total").increment(claim.blocked.len() as u64);
        counter!("pipeline_items_claimed_total", "cycle" => "crawl")
            .increment(claim.claimed.len() as u64);
        for item in &claim.blocked {
            info!(item_id = %item.id, domain = %item.domain, kind = %FailureKind::PolicyBlocked, "Domain blocked by policy");
        }

        if claim.claimed.is_empty() {
            return Ok(report);
        }

        let handles: Vec<_> = claim
            .claimed
            .iter()
            .cloned()
            .map(|item| {
                let ctx = self.ctx.clone();
                tokio::spawn(async move { process_item(&ctx, &item).await })
            })
            .collect();

        let results = join_all(handles).await;

        for (item, joined) in claim.claimed.iter().zip(results) {
            let result = match joined {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    error!(item_id = %item.id, domain = %item.domain, error = %e, "Crawl task failed");
                    self.ctx.record_task_failure(item, e.to_string()).await
                }
                Err(join_err) => {
                    error!(item_id = %item.id, domain = %item.domain, error = %join_err, "Crawl task panicked");
                    self.ctx
                        .record_task_failure(item, format!("Crawl task panicked: {}", join_err))
                        .await
                }
            };

            let outcome = match result {
                ItemResult::Succeeded => {
                    report.succeeded += 1;
                    "ok"
                }
                ItemResult::Failed => {
                    report.failed += 1;
                    "fail"
                }
                ItemResult::Discarded => {
                    report.discarded += 1;
                    "discarded"
                }
            };
            counter!("pipeline_crawl_outcomes_total", "outcome" => outcome).increment(1);
        }

        Ok(report)
    }
}

impl CrawlContext {
    /// 任务边界兜底：把出错或崩溃的任务记录为抓取失败
    async fn record_task_failure(&self, item: &WorkItem, error: String) -> ItemResult {
        let outcome = CrawlOutcome::Failed {
            url: crawl_url(&self.scheme, &item.domain),
            raw_status: None,
            error,
        };
        match self.items.record_crawl_outcome(item, &outcome).await {
            Ok(true) => ItemResult::Failed,
            Ok(false) => ItemResult::Discarded,
            Err(e) => {
                // 工作项留在 CRAWLING，由恢复监控回退
                error!(item_id = %item.id, error = %e, "Failed to record crawl failure");
                ItemResult::Failed
            }
        }
    }

    /// 根据抓取响应得出结局，成功的内容先写入内容存储
    async fn evaluate(&self, item: &WorkItem, url: String, response: FetchResponse) -> CrawlOutcome {
        let raw_status = response.raw_status.map(i32::from);
        let length = response
            .content
            .as_deref()
            .map(|c| c.trim().chars().count())
            .unwrap_or(0);

        let content = match response.content {
            Some(content) if response.ok && length >= self.min_content_length => content,
            _ => {
                let error = match response.error {
                    Some(error) => error,
                    None if length == 0 => "No content".to_string(),
                    None => format!(
                        "Content too short ({} < {} chars)",
                        length, self.min_content_length
                    ),
                };
                return CrawlOutcome::Failed {
                    url,
                    raw_status,
                    error,
                };
            }
        };

        let key = content_key(&item.domain, Utc::now());
        match self.content.save(&key, &content).await {
            Ok(content_location) => CrawlOutcome::Succeeded {
                url,
                content_location,
                raw_status,
            },
            Err(e) => CrawlOutcome::Failed {
                url,
                raw_status,
                error: format!("Failed to store content: {}", e),
            },
        }
    }
}

#[instrument(skip(ctx, item), fields(item_id = %item.id, domain = %item.domain))]
async fn process_item(ctx: &CrawlContext, item: &WorkItem) -> Result<ItemResult, WorkerError> {
    let url = crawl_url(&ctx.scheme, &item.domain);

    let outcome = match ctx.crawler.fetch(&url).await {
        Ok(response) => ctx.evaluate(item, url, response).await,
        Err(e) => CrawlOutcome::Failed {
            url,
            raw_status: None,
            error: e.to_string(),
        },
    };

    let success = outcome.is_success();
    if !ctx.items.record_crawl_outcome(item, &outcome).await? {
        warn!("Crawl claim was superseded before the fetch finished, result discarded");
        return Ok(ItemResult::Discarded);
    }

    if success {
        debug!("Crawl succeeded");
        Ok(ItemResult::Succeeded)
    } else {
        debug!(kind = %FailureKind::FetchFailure, "Crawl failed");
        Ok(ItemResult::Failed)
    }
}

#[async_trait]
impl Worker for CrawlCycle {
    async fn run(&self) -> Result<(), WorkerError> {
        let start = Instant::now();
        let report = self.run_cycle().await?;
        histogram!("pipeline_cycle_duration_seconds", "cycle" => "crawl")
            .record(start.elapsed().as_secs_f64());

        if report.claimed + report.blocked > 0 {
            info!(
                claimed = report.claimed,
                blocked = report.blocked,
                succeeded = report.succeeded,
                failed = report.failed,
                discarded = report.discarded,
                "Crawl cycle finished"
            );
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "crawl_cycle"
    }
}
