// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use domain_intel::application::orchestrator::{Orchestrator, PipelineComponents};
use domain_intel::config::settings::Settings;
use domain_intel::domain::models::classification::{CategoryHints, Classification};
use domain_intel::domain::models::work_item::WorkItemStatus;
use domain_intel::domain::services::policy_engine::PolicyEngine;
use domain_intel::engines::traits::{
    Analyzer, AnalyzerError, Crawler, CrawlerError, FetchResponse, KnowledgeError, KnowledgeStore,
};
use domain_intel::infrastructure::database::entities::work_item as work_item_entity;
use domain_intel::infrastructure::repositories::audit_log_repo_impl::AuditLogRepositoryImpl;
use domain_intel::infrastructure::repositories::category_repo_impl::CategoryRepositoryImpl;
use domain_intel::infrastructure::repositories::policy_rule_repo_impl::PolicyRuleRepositoryImpl;
use domain_intel::infrastructure::repositories::work_item_repo_impl::WorkItemRepositoryImpl;
use domain_intel::infrastructure::storage::InMemoryContentStore;
use domain_intel::workers::analysis_cycle::{AnalysisCycle, AnalysisCycleConfig, AnalysisDeps};
use domain_intel::workers::clock::CycleClock;
use domain_intel::workers::crawl_cycle::{CrawlCycle, CrawlCycleConfig};
use domain_intel::workers::recovery_monitor::RecoveryMonitor;
use migration::{Migrator, MigratorTrait};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, Database, DatabaseConnection, EntityTrait, QueryFilter};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// 足够通过最小长度检查的页面内容
pub const PAGE_TEXT: &str = "Welcome to our secure banking portal. Please log in with your account number and password to continue.";

pub async fn setup_db() -> Arc<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    let db = Arc::new(db);
    Migrator::up(db.as_ref(), None).await.unwrap();
    db
}

/// 直接改写工作项状态，用于构造难以经由流水线到达的场景
pub async fn force_status(db: &DatabaseConnection, id: Uuid, status: WorkItemStatus) {
    work_item_entity::Entity::update_many()
        .col_expr(
            work_item_entity::Column::Status,
            Expr::value(status.to_string()),
        )
        .filter(work_item_entity::Column::Id.eq(id))
        .exec(db)
        .await
        .unwrap();
}

pub fn test_settings() -> Settings {
    Settings::defaults()
        .unwrap()
        .set_override("database.url", "sqlite::memory:")
        .unwrap()
        .set_override("storage.storage_type", "memory")
        .unwrap()
        .set_override("pipeline.crawl_interval_secs", 1)
        .unwrap()
        .set_override("pipeline.analysis_interval_secs", 1)
        .unwrap()
        .set_override("pipeline.analysis_timeout_secs", 2)
        .unwrap()
        .set_override("recovery.sweep_interval_secs", 1)
        .unwrap()
        .build()
        .unwrap()
        .try_deserialize()
        .unwrap()
}

pub struct MockCrawler {
    calls: AtomicUsize,
    delay: Duration,
    responses: Mutex<HashMap<String, FetchResponse>>,
}

impl MockCrawler {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay,
            responses: Mutex::new(HashMap::new()),
        }
    }

    /// 为某个域名指定响应，其余域名返回 PAGE_TEXT
    pub fn respond(&self, domain: &str, response: FetchResponse) {
        self.responses
            .lock()
            .unwrap()
            .insert(domain.to_string(), response);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Crawler for MockCrawler {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, CrawlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let domain = url.split("://").nth(1).unwrap_or(url);
        let response = self
            .responses
            .lock()
            .unwrap()
            .get(domain)
            .cloned()
            .unwrap_or_else(|| FetchResponse::success(200, PAGE_TEXT));
        Ok(response)
    }
}

pub enum AnalyzerBehavior {
    Answer(Classification),
    /// 等待一段时间后给出结论
    Slow(Duration, Classification),
    Nothing,
    Hang,
}

pub struct MockAnalyzer {
    calls: AtomicUsize,
    behavior: AnalyzerBehavior,
}

impl MockAnalyzer {
    pub fn new(behavior: AnalyzerBehavior) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            behavior,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn malicious_verdict() -> Classification {
    Classification {
        category: "Malicious".to_string(),
        malicious: true,
        confidence: 0.92,
        summary: "Credential phishing page imitating a bank".to_string(),
        model: "mock-model".to_string(),
    }
}

#[async_trait]
impl Analyzer for MockAnalyzer {
    async fn classify(
        &self,
        _domain: &str,
        _content: &str,
        _category_hints: &CategoryHints,
    ) -> Result<Option<Classification>, AnalyzerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            AnalyzerBehavior::Answer(classification) => Ok(Some(classification.clone())),
            AnalyzerBehavior::Slow(delay, classification) => {
                tokio::time::sleep(*delay).await;
                Ok(Some(classification.clone()))
            }
            AnalyzerBehavior::Nothing => Ok(None),
            AnalyzerBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(None)
            }
        }
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

#[derive(Default)]
pub struct MockKnowledgeStore {
    fail: bool,
    hang: bool,
    indexed: Mutex<Vec<(String, String, bool)>>,
}

impl MockKnowledgeStore {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// 永远不返回的知识库
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    /// 已写入的 (域名, 分类, 是否恶意)
    pub fn indexed(&self) -> Vec<(String, String, bool)> {
        self.indexed.lock().unwrap().clone()
    }
}

#[async_trait]
impl KnowledgeStore for MockKnowledgeStore {
    async fn index(
        &self,
        domain: &str,
        _text: &str,
        category: &str,
        malicious: bool,
    ) -> Result<(), KnowledgeError> {
        if self.fail {
            return Err(KnowledgeError::Status(503));
        }
        if self.hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.indexed
            .lock()
            .unwrap()
            .push((domain.to_string(), category.to_string(), malicious));
        Ok(())
    }
}

/// 一套基于内存数据库和模拟协作方的流水线
pub struct TestPipeline {
    pub db: Arc<DatabaseConnection>,
    pub items: Arc<WorkItemRepositoryImpl>,
    pub audit: Arc<AuditLogRepositoryImpl>,
    pub rules: Arc<PolicyRuleRepositoryImpl>,
    pub categories: Arc<CategoryRepositoryImpl>,
    pub policy: Arc<PolicyEngine>,
    pub content: Arc<InMemoryContentStore>,
    pub clock: Arc<CycleClock>,
    pub crawler: Arc<MockCrawler>,
    pub analyzer: Arc<MockAnalyzer>,
    pub knowledge: Arc<MockKnowledgeStore>,
}

impl TestPipeline {
    pub async fn new(crawler: MockCrawler, analyzer: MockAnalyzer) -> Self {
        Self::with_knowledge(crawler, analyzer, MockKnowledgeStore::default()).await
    }

    pub async fn with_knowledge(
        crawler: MockCrawler,
        analyzer: MockAnalyzer,
        knowledge: MockKnowledgeStore,
    ) -> Self {
        let db = setup_db().await;
        let rules = Arc::new(PolicyRuleRepositoryImpl::new(db.clone()));
        Self {
            items: Arc::new(WorkItemRepositoryImpl::new(db.clone())),
            audit: Arc::new(AuditLogRepositoryImpl::new(db.clone())),
            categories: Arc::new(CategoryRepositoryImpl::new(db.clone())),
            policy: Arc::new(PolicyEngine::new(rules.clone(), None)),
            rules,
            content: Arc::new(InMemoryContentStore::new()),
            clock: Arc::new(CycleClock::new()),
            crawler: Arc::new(crawler),
            analyzer: Arc::new(analyzer),
            knowledge: Arc::new(knowledge),
            db,
        }
    }

    pub fn crawl_cycle(&self) -> CrawlCycle {
        CrawlCycle::new(
            self.items.clone(),
            self.policy.clone(),
            self.crawler.clone(),
            self.content.clone(),
            self.clock.clone(),
            CrawlCycleConfig {
                batch_size: 30,
                min_content_length: 50,
                scheme: "https".to_string(),
            },
        )
    }

    pub fn analysis_cycle(&self, deadline: Duration) -> AnalysisCycle {
        AnalysisCycle::new(
            AnalysisDeps {
                items: self.items.clone(),
                audit: self.audit.clone(),
                categories: self.categories.clone(),
                content: self.content.clone(),
                analyzer: self.analyzer.clone(),
                knowledge: self.knowledge.clone(),
            },
            self.clock.clone(),
            AnalysisCycleConfig {
                batch_size: 20,
                deadline,
                knowledge_deadline: Duration::from_millis(200),
            },
        )
    }

    pub fn recovery(&self, staleness: Duration) -> RecoveryMonitor {
        RecoveryMonitor::new(
            self.items.clone(),
            self.clock.clone(),
            staleness,
            Duration::from_secs(300),
        )
    }

    pub fn orchestrator(&self, settings: &Settings) -> Orchestrator {
        Orchestrator::new(
            PipelineComponents {
                items: self.items.clone(),
                audit: self.audit.clone(),
                categories: self.categories.clone(),
                policy: self.policy.clone(),
                content: self.content.clone(),
                crawler: self.crawler.clone(),
                analyzer: self.analyzer.clone(),
                knowledge: self.knowledge.clone(),
            },
            settings,
        )
    }
}
