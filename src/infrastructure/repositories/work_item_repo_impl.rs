// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::domain::models::audit_log::{AuditStage, NewAuditEntry};
use crate::domain::models::classification::{Classification, ClassificationResult};
use crate::domain::models::fetch_result::{CrawlOutcome, FetchResult};
use crate::domain::models::work_item::{WorkItem, WorkItemStatus};
use crate::domain::repositories::work_item_repository::{
    CrawlClaim, ReclassifySummary, RecoveredItem, RepositoryError, WorkItemRepository,
};
use crate::domain::services::policy_engine::PolicySnapshot;
use crate::infrastructure::database::entities::{
    classification_result as classification_entity, fetch_result as fetch_entity,
    work_item as work_item_entity,
};
use crate::infrastructure::repositories::audit_log_repo_impl::insert_entry;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{
    sea_query::{Expr, LockBehavior, LockType, OnConflict},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// 工作项仓库实现
///
/// 基于SeaORM实现的工作项数据访问层。认领和完成都是
/// 带状态条件的更新，SQLite 不支持 `FOR UPDATE` 时同样成立。
#[derive(Clone)]
pub struct WorkItemRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl WorkItemRepositoryImpl {
    /// 创建新的工作项仓库实例
    ///
    /// # 参数
    ///
    /// * `db` - 数据库连接
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl TryFrom<work_item_entity::Model> for WorkItem {
    type Error = RepositoryError;

    fn try_from(model: work_item_entity::Model) -> Result<Self, Self::Error> {
        let status = parse_status(model.id, &model.status)?;
        Ok(Self {
            id: model.id,
            domain: model.domain,
            status,
            priority: model.priority,
            source: model.source,
            retry_count: model.retry_count,
            created_at: model.created_at,
            updated_at: model.updated_at,
            completed_at: model.completed_at,
        })
    }
}

fn parse_status(id: Uuid, raw: &str) -> Result<WorkItemStatus, RepositoryError> {
    raw.parse().map_err(|_| {
        RepositoryError::CorruptRecord(format!("work item {} has unknown status '{}'", id, raw))
    })
}

fn to_items(models: Vec<work_item_entity::Model>) -> Result<Vec<WorkItem>, RepositoryError> {
    models.into_iter().map(WorkItem::try_from).collect()
}

impl From<&WorkItem> for work_item_entity::ActiveModel {
    fn from(item: &WorkItem) -> Self {
        Self {
            id: Set(item.id),
            domain: Set(item.domain.clone()),
            status: Set(item.status.to_string()),
            priority: Set(item.priority),
            source: Set(item.source.clone()),
            retry_count: Set(item.retry_count),
            created_at: Set(item.created_at),
            updated_at: Set(item.updated_at),
            completed_at: Set(item.completed_at),
        }
    }
}

impl From<fetch_entity::Model> for FetchResult {
    fn from(model: fetch_entity::Model) -> Self {
        Self {
            item_id: model.item_id,
            url: model.url,
            content_location: model.content_location,
            raw_status: model.raw_status,
            error: model.error,
            fetched_at: model.fetched_at,
        }
    }
}

impl From<classification_entity::Model> for ClassificationResult {
    fn from(model: classification_entity::Model) -> Self {
        Self {
            item_id: model.item_id,
            classification: Classification {
                category: model.category,
                malicious: model.is_malicious,
                confidence: model.confidence,
                summary: model.summary,
                model: model.model,
            },
            analyzed_at: model.analyzed_at,
        }
    }
}

/// 比较并设置状态
///
/// 只有当数据库中的状态和重试次数仍等于 `current` 时才写入 `next`。
///
/// # 返回值
///
/// 写入生效返回true，状态已被其他人改变返回false
async fn compare_and_set<C: ConnectionTrait>(
    conn: &C,
    current: &WorkItem,
    next: &WorkItem,
    bump_retry: bool,
) -> Result<bool, RepositoryError> {
    let mut update = work_item_entity::Entity::update_many()
        .col_expr(
            work_item_entity::Column::Status,
            Expr::value(next.status.to_string()),
        )
        .col_expr(
            work_item_entity::Column::UpdatedAt,
            Expr::value(next.updated_at),
        )
        .col_expr(
            work_item_entity::Column::CompletedAt,
            Expr::value(next.completed_at),
        );

    if bump_retry {
        update = update.col_expr(
            work_item_entity::Column::RetryCount,
            Expr::col(work_item_entity::Column::RetryCount).add(1),
        );
    }

    let result = update
        .filter(work_item_entity::Column::Id.eq(current.id))
        .filter(work_item_entity::Column::Status.eq(current.status.to_string()))
        .filter(work_item_entity::Column::RetryCount.eq(current.retry_count))
        .exec(conn)
        .await?;

    Ok(result.rows_affected == 1)
}

/// 在事务中读取工作项，并确认它仍属于调用方持有的那次认领
///
/// 状态或重试次数与 `claimed` 不同都说明认领已失效。
async fn load_claimed<C: ConnectionTrait>(
    conn: &C,
    claimed: &WorkItem,
    expected: WorkItemStatus,
) -> Result<Option<WorkItem>, RepositoryError> {
    if claimed.status != expected {
        return Ok(None);
    }
    let Some(model) = work_item_entity::Entity::find_by_id(claimed.id)
        .one(conn)
        .await?
    else {
        return Ok(None);
    };
    let item = WorkItem::try_from(model)?;
    Ok((item.status == expected && item.retry_count == claimed.retry_count).then_some(item))
}

/// 插入工作项，域名冲突时不做任何事
async fn insert_if_absent<C: ConnectionTrait>(
    conn: &C,
    item: &WorkItem,
) -> Result<bool, RepositoryError> {
    let model: work_item_entity::ActiveModel = item.into();

    let inserted = work_item_entity::Entity::insert(model)
        .on_conflict(
            OnConflict::column(work_item_entity::Column::Domain)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;

    Ok(inserted == 1)
}

fn status_strings(statuses: &[WorkItemStatus]) -> Vec<String> {
    statuses.iter().map(ToString::to_string).collect()
}

#[async_trait]
impl WorkItemRepository for WorkItemRepositoryImpl {
    async fn create_if_absent(&self, item: &WorkItem) -> Result<Option<WorkItem>, RepositoryError> {
        let inserted = insert_if_absent(self.db.as_ref(), item).await?;
        Ok(inserted.then(|| item.clone()))
    }

    async fn submit(
        &self,
        item: &WorkItem,
        audit: NewAuditEntry,
    ) -> Result<Option<WorkItem>, RepositoryError> {
        let txn = self.db.begin().await?;

        if !insert_if_absent(&txn, item).await? {
            return Ok(None);
        }
        insert_entry(&txn, audit).await?;

        txn.commit().await?;
        Ok(Some(item.clone()))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<WorkItem>, RepositoryError> {
        let model = work_item_entity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?;

        model.map(WorkItem::try_from).transpose()
    }

    async fn find_by_domain(&self, domain: &str) -> Result<Option<WorkItem>, RepositoryError> {
        let model = work_item_entity::Entity::find()
            .filter(work_item_entity::Column::Domain.eq(domain))
            .one(self.db.as_ref())
            .await?;

        model.map(WorkItem::try_from).transpose()
    }

    async fn claim_crawl_batch(
        &self,
        limit: u64,
        policy: &PolicySnapshot,
    ) -> Result<CrawlClaim, RepositoryError> {
        let txn = self.db.begin().await?;

        let candidates = work_item_entity::Entity::find()
            .filter(
                work_item_entity::Column::Status
                    .is_in(status_strings(&WorkItemStatus::CRAWL_READY)),
            )
            .order_by_asc(work_item_entity::Column::Priority)
            .order_by_asc(work_item_entity::Column::CreatedAt)
            .order_by_asc(work_item_entity::Column::Id)
            .limit(limit)
            .lock_with_behavior(LockType::Update, LockBehavior::SkipLocked)
            .all(&txn)
            .await?;

        let mut claim = CrawlClaim::default();
        for item in to_items(candidates)? {
            let blocked = policy.is_blocked(&item.domain);
            let target = if blocked {
                WorkItemStatus::Blocked
            } else {
                WorkItemStatus::Crawling
            };

            let next = item.clone().transition(target)?;
            if !compare_and_set(&txn, &item, &next, false).await? {
                continue;
            }

            if blocked {
                insert_entry(
                    &txn,
                    NewAuditEntry::warning(
                        item.id,
                        AuditStage::Policy,
                        format!("Domain {} blocked by policy", item.domain),
                    ),
                )
                .await?;
                claim.blocked.push(next);
            } else {
                claim.claimed.push(next);
            }
        }

        txn.commit().await?;
        Ok(claim)
    }

    async fn claim_analysis_batch(&self, limit: u64) -> Result<Vec<WorkItem>, RepositoryError> {
        let txn = self.db.begin().await?;

        let candidates = work_item_entity::Entity::find()
            .filter(work_item_entity::Column::Status.eq(WorkItemStatus::CrawledOk.to_string()))
            .order_by_asc(work_item_entity::Column::Priority)
            .order_by_asc(work_item_entity::Column::UpdatedAt)
            .order_by_asc(work_item_entity::Column::Id)
            .limit(limit)
            .lock_with_behavior(LockType::Update, LockBehavior::SkipLocked)
            .all(&txn)
            .await?;

        let mut claimed = Vec::with_capacity(candidates.len());
        for item in to_items(candidates)? {
            let next = item.clone().transition(WorkItemStatus::Analyzing)?;
            if compare_and_set(&txn, &item, &next, false).await? {
                claimed.push(next);
            }
        }

        txn.commit().await?;
        Ok(claimed)
    }

    async fn record_crawl_outcome(
        &self,
        claimed: &WorkItem,
        outcome: &CrawlOutcome,
    ) -> Result<bool, RepositoryError> {
        let id = claimed.id;
        let txn = self.db.begin().await?;

        let Some(item) = load_claimed(&txn, claimed, WorkItemStatus::Crawling).await? else {
            return Ok(false);
        };

        let (target, url, content_location, raw_status, error, audit) = match outcome {
            CrawlOutcome::Succeeded {
                url,
                content_location,
                raw_status,
            } => (
                WorkItemStatus::CrawledOk,
                url.clone(),
                Some(content_location.clone()),
                *raw_status,
                None,
                NewAuditEntry::info(
                    id,
                    AuditStage::Crawler,
                    format!("Fetched {} into {}", url, content_location),
                ),
            ),
            CrawlOutcome::Failed {
                url,
                raw_status,
                error,
            } => (
                WorkItemStatus::CrawledFail,
                url.clone(),
                None,
                *raw_status,
                Some(error.clone()),
                NewAuditEntry::error(
                    id,
                    AuditStage::Crawler,
                    format!("Fetch of {} failed: {}", url, error),
                ),
            ),
        };

        let next = item.clone().transition(target)?;
        if !compare_and_set(&txn, &item, &next, false).await? {
            return Ok(false);
        }

        let fetch = fetch_entity::ActiveModel {
            id: Set(Uuid::new_v4()),
            item_id: Set(id),
            url: Set(url),
            content_location: Set(content_location),
            raw_status: Set(raw_status),
            error: Set(error),
            fetched_at: Set(Utc::now().into()),
        };
        fetch_entity::Entity::insert(fetch)
            .on_conflict(
                OnConflict::column(fetch_entity::Column::ItemId)
                    .update_columns([
                        fetch_entity::Column::Url,
                        fetch_entity::Column::ContentLocation,
                        fetch_entity::Column::RawStatus,
                        fetch_entity::Column::Error,
                        fetch_entity::Column::FetchedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;

        insert_entry(&txn, audit).await?;

        txn.commit().await?;
        Ok(true)
    }

    async fn complete_analysis(
        &self,
        claimed: &WorkItem,
        classification: &Classification,
    ) -> Result<bool, RepositoryError> {
        let id = claimed.id;
        let txn = self.db.begin().await?;

        let Some(item) = load_claimed(&txn, claimed, WorkItemStatus::Analyzing).await? else {
            return Ok(false);
        };

        let next = item.clone().transition(WorkItemStatus::Completed)?;
        if !compare_and_set(&txn, &item, &next, false).await? {
            return Ok(false);
        }

        let model = classification_entity::ActiveModel {
            id: Set(Uuid::new_v4()),
            item_id: Set(id),
            category: Set(classification.category.clone()),
            is_malicious: Set(classification.malicious),
            confidence: Set(classification.confidence),
            summary: Set(classification.summary.clone()),
            model: Set(classification.model.clone()),
            analyzed_at: Set(Utc::now().into()),
        };
        classification_entity::Entity::insert(model)
            .on_conflict(
                OnConflict::column(classification_entity::Column::ItemId)
                    .update_columns([
                        classification_entity::Column::Category,
                        classification_entity::Column::IsMalicious,
                        classification_entity::Column::Confidence,
                        classification_entity::Column::Summary,
                        classification_entity::Column::Model,
                        classification_entity::Column::AnalyzedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;

        insert_entry(
            &txn,
            NewAuditEntry::info(
                id,
                AuditStage::Analyzer,
                format!(
                    "Classified as {} (malicious={}, confidence={:.2}, model={})",
                    classification.category,
                    classification.malicious,
                    classification.confidence,
                    classification.model
                ),
            ),
        )
        .await?;

        txn.commit().await?;
        Ok(true)
    }

    async fn fail_analysis(
        &self,
        claimed: &WorkItem,
        audit: NewAuditEntry,
    ) -> Result<bool, RepositoryError> {
        let txn = self.db.begin().await?;

        let Some(item) = load_claimed(&txn, claimed, WorkItemStatus::Analyzing).await? else {
            return Ok(false);
        };

        let next = item.clone().transition(WorkItemStatus::AnalysisFail)?;
        if !compare_and_set(&txn, &item, &next, false).await? {
            return Ok(false);
        }
        insert_entry(&txn, audit).await?;

        txn.commit().await?;
        Ok(true)
    }

    async fn find_fetch_result(&self, id: Uuid) -> Result<Option<FetchResult>, RepositoryError> {
        let model = fetch_entity::Entity::find()
            .filter(fetch_entity::Column::ItemId.eq(id))
            .one(self.db.as_ref())
            .await?;

        Ok(model.map(Into::into))
    }

    async fn find_classification(
        &self,
        id: Uuid,
    ) -> Result<Option<ClassificationResult>, RepositoryError> {
        let model = classification_entity::Entity::find()
            .filter(classification_entity::Column::ItemId.eq(id))
            .one(self.db.as_ref())
            .await?;

        Ok(model.map(Into::into))
    }

    async fn roll_back_active(
        &self,
        stale_before: Option<DateTime<FixedOffset>>,
    ) -> Result<Vec<RecoveredItem>, RepositoryError> {
        let txn = self.db.begin().await?;

        let mut query = work_item_entity::Entity::find().filter(
            work_item_entity::Column::Status.is_in(status_strings(&[
                WorkItemStatus::Crawling,
                WorkItemStatus::Analyzing,
            ])),
        );
        if let Some(threshold) = stale_before {
            query = query.filter(work_item_entity::Column::UpdatedAt.lt(threshold));
        }
        let stuck = query
            .order_by_asc(work_item_entity::Column::UpdatedAt)
            .all(&txn)
            .await?;

        let mut recovered = Vec::with_capacity(stuck.len());
        for item in to_items(stuck)? {
            let Some(target) = item.status.rollback_target() else {
                continue;
            };
            let next = item.clone().transition(target)?;
            if !compare_and_set(&txn, &item, &next, true).await? {
                continue;
            }

            let message = match stale_before {
                None => format!(
                    "Recovered orphaned item at startup: {} -> {}",
                    item.status, target
                ),
                Some(_) => format!(
                    "Rolled back stalled item (last update {}): {} -> {}",
                    item.updated_at.to_rfc3339(),
                    item.status,
                    target
                ),
            };
            insert_entry(
                &txn,
                NewAuditEntry::warning(item.id, AuditStage::Recovery, message),
            )
            .await?;

            recovered.push(RecoveredItem {
                id: item.id,
                domain: item.domain,
                from: item.status,
                to: target,
            });
        }

        txn.commit().await?;
        Ok(recovered)
    }

    async fn reclassify_failures(&self) -> Result<ReclassifySummary, RepositoryError> {
        let txn = self.db.begin().await?;

        let failed = work_item_entity::Entity::find()
            .filter(work_item_entity::Column::Status.is_in(status_strings(&[
                WorkItemStatus::CrawledFail,
                WorkItemStatus::AnalysisFail,
            ])))
            .order_by_asc(work_item_entity::Column::UpdatedAt)
            .all(&txn)
            .await?;

        let mut summary = ReclassifySummary::default();
        for item in to_items(failed)? {

            let target = match item.status {
                WorkItemStatus::AnalysisFail => {
                    let has_content = fetch_entity::Entity::find()
                        .filter(fetch_entity::Column::ItemId.eq(item.id))
                        .filter(fetch_entity::Column::ContentLocation.is_not_null())
                        .count(&txn)
                        .await?
                        > 0;
                    if has_content {
                        WorkItemStatus::CrawledOk
                    } else {
                        WorkItemStatus::Queued
                    }
                }
                _ => WorkItemStatus::Queued,
            };

            let next = item.clone().transition(target)?;
            if !compare_and_set(&txn, &item, &next, true).await? {
                continue;
            }

            match (item.status, target) {
                (WorkItemStatus::CrawledFail, _) => summary.crawl_failures_requeued += 1,
                (_, WorkItemStatus::CrawledOk) => summary.analysis_failures_reanalyzed += 1,
                _ => summary.analysis_failures_requeued += 1,
            }

            insert_entry(
                &txn,
                NewAuditEntry::info(
                    item.id,
                    AuditStage::Operator,
                    format!("Retry requested: {} -> {}", item.status, target),
                ),
            )
            .await?;
        }

        txn.commit().await?;
        Ok(summary)
    }

    async fn archive(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let txn = self.db.begin().await?;

        let item = work_item_entity::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or(RepositoryError::NotFound)
            .and_then(WorkItem::try_from)?;

        let next = item.clone().transition(WorkItemStatus::Archived)?;
        if !compare_and_set(&txn, &item, &next, false).await? {
            return Ok(false);
        }
        insert_entry(
            &txn,
            NewAuditEntry::info(id, AuditStage::Operator, "Archived"),
        )
        .await?;

        txn.commit().await?;
        Ok(true)
    }

    async fn count_by_status(&self) -> Result<BTreeMap<WorkItemStatus, u64>, RepositoryError> {
        let rows: Vec<(String, i64)> = work_item_entity::Entity::find()
            .select_only()
            .column(work_item_entity::Column::Status)
            .column_as(work_item_entity::Column::Id.count(), "count")
            .group_by(work_item_entity::Column::Status)
            .into_tuple()
            .all(self.db.as_ref())
            .await?;

        let mut counts = BTreeMap::new();
        for (status, count) in rows {
            let status = status.parse::<WorkItemStatus>().map_err(|_| {
                RepositoryError::CorruptRecord(format!("unknown status '{}'", status))
            })?;
            counts.insert(status, count.max(0) as u64);
        }
        Ok(counts)
    }

    async fn find_stuck(
        &self,
        updated_before: DateTime<FixedOffset>,
        limit: u64,
    ) -> Result<Vec<WorkItem>, RepositoryError> {
        let models = work_item_entity::Entity::find()
            .filter(work_item_entity::Column::Status.is_in(status_strings(&[
                WorkItemStatus::Crawling,
                WorkItemStatus::Analyzing,
            ])))
            .filter(work_item_entity::Column::UpdatedAt.lt(updated_before))
            .order_by_asc(work_item_entity::Column::UpdatedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await?;

        to_items(models)
    }

    async fn count_stuck(
        &self,
        status: WorkItemStatus,
        updated_before: DateTime<FixedOffset>,
    ) -> Result<u64, RepositoryError> {
        let count = work_item_entity::Entity::find()
            .filter(work_item_entity::Column::Status.eq(status.to_string()))
            .filter(work_item_entity::Column::UpdatedAt.lt(updated_before))
            .count(self.db.as_ref())
            .await?;

        Ok(count)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        self.db.ping().await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "work_item_repo_impl_test.rs"]
mod tests;
