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

use domain_intel::application::orchestrator::{Orchestrator, PipelineComponents};
use domain_intel::config::settings::Settings;
use domain_intel::domain::services::policy_engine::PolicyEngine;
use domain_intel::engines::knowledge_store::create_knowledge_store;
use domain_intel::engines::llm_analyzer::HttpAnalyzer;
use domain_intel::engines::reqwest_crawler::ReqwestCrawler;
use domain_intel::infrastructure::database::connection;
use domain_intel::infrastructure::metrics::init_metrics;
use domain_intel::infrastructure::repositories::audit_log_repo_impl::AuditLogRepositoryImpl;
use domain_intel::infrastructure::repositories::category_repo_impl::CategoryRepositoryImpl;
use domain_intel::infrastructure::repositories::policy_rule_repo_impl::PolicyRuleRepositoryImpl;
use domain_intel::infrastructure::repositories::work_item_repo_impl::WorkItemRepositoryImpl;
use domain_intel::infrastructure::storage::create_content_store;
use domain_intel::utils::telemetry;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// 主函数
///
/// 初始化所有组件，执行启动恢复后启动调度器，收到 Ctrl-C 后排空退出
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize logging
    telemetry::init_telemetry();
    info!("Starting domain-intel...");

    // 2. Load configuration
    let settings = Settings::new()?;
    info!("Configuration loaded");

    init_metrics(&settings.metrics);

    // 3. Open the store; this is the only fatal startup step
    let db = Arc::new(connection::connect_and_migrate(&settings.database).await?);

    // 4. Initialize components
    let items = Arc::new(WorkItemRepositoryImpl::new(db.clone()));
    let audit = Arc::new(AuditLogRepositoryImpl::new(db.clone()));
    let categories = Arc::new(CategoryRepositoryImpl::new(db.clone()));
    let rules = Arc::new(PolicyRuleRepositoryImpl::new(db.clone()));

    let policy = Arc::new(PolicyEngine::new(
        rules,
        settings.policy.blocklist_path.as_ref().map(PathBuf::from),
    ));
    let content = create_content_store(&settings.storage)?;
    let crawler = Arc::new(ReqwestCrawler::new(&settings.crawler)?);
    let analyzer = Arc::new(HttpAnalyzer::new(&settings.analyzer));
    let knowledge = create_knowledge_store(&settings.knowledge)?;

    let orchestrator = Arc::new(Orchestrator::new(
        PipelineComponents {
            items,
            audit,
            categories,
            policy,
            content,
            crawler,
            analyzer,
            knowledge,
        },
        &settings,
    ));

    // 5. Recover and start the cycles
    orchestrator.start().await?;
    let stats = orchestrator.pipeline_stats().await?;
    info!(total = stats.total, "Pipeline running");

    // 6. Wait for shutdown
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, draining cycles");
    orchestrator.stop().await;

    Ok(())
}
