// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{AnalyzerBehavior, MockAnalyzer, MockCrawler, TestPipeline};
use chrono::Utc;
use domain_intel::domain::models::work_item::{WorkItem, WorkItemStatus};
use domain_intel::domain::repositories::audit_log_repository::AuditLogRepository;
use domain_intel::domain::repositories::work_item_repository::WorkItemRepository;
use domain_intel::domain::services::policy_engine::PolicySnapshot;
use domain_intel::workers::clock::Cycle;
use std::time::Duration;

async fn pipeline() -> TestPipeline {
    TestPipeline::new(MockCrawler::new(), MockAnalyzer::new(AnalyzerBehavior::Nothing)).await
}

async fn claimed_for_crawl(pipeline: &TestPipeline, domain: &str) -> WorkItem {
    let item = WorkItem::new(domain.to_string(), "feed".to_string(), 3);
    pipeline.items.create_if_absent(&item).await.unwrap().unwrap();
    let claim = pipeline
        .items
        .claim_crawl_batch(10, &PolicySnapshot::empty())
        .await
        .unwrap();
    assert_eq!(claim.claimed.len(), 1);
    claim.claimed.into_iter().next().unwrap()
}

#[tokio::test]
async fn test_stale_crawling_item_rolled_back_once() {
    let pipeline = pipeline().await;
    let item = claimed_for_crawl(&pipeline, "stuck.example.org").await;

    let monitor = pipeline.recovery(Duration::from_secs(600));
    assert!(monitor.sweep().await.unwrap().is_empty());

    tokio::time::sleep(Duration::from_millis(20)).await;
    let eager = pipeline.recovery(Duration::ZERO);
    let recovered = eager.sweep().await.unwrap();
    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0].from, WorkItemStatus::Crawling);
    assert_eq!(recovered[0].to, WorkItemStatus::Discovered);

    let reloaded = pipeline.items.find_by_id(item.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, WorkItemStatus::Discovered);
    assert_eq!(reloaded.retry_count, 1);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(eager.sweep().await.unwrap().is_empty());

    let recovery_entries = pipeline
        .audit
        .find_by_item(item.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|entry| entry.stage == "RECOVERY")
        .count();
    assert_eq!(recovery_entries, 1);
}

#[tokio::test]
async fn test_startup_sweep_rolls_back_every_active_item() {
    let pipeline = pipeline().await;
    let crawling = claimed_for_crawl(&pipeline, "crawling.example.org").await;

    let analyzing = claimed_for_crawl(&pipeline, "analyzing.example.org").await;
    super::helpers::force_status(&pipeline.db, analyzing.id, WorkItemStatus::Analyzing).await;

    let recovered = pipeline
        .recovery(Duration::from_secs(600))
        .startup_sweep()
        .await
        .unwrap();
    assert_eq!(recovered.len(), 2);

    let crawling = pipeline.items.find_by_id(crawling.id).await.unwrap().unwrap();
    let analyzing = pipeline.items.find_by_id(analyzing.id).await.unwrap().unwrap();
    assert_eq!(crawling.status, WorkItemStatus::Discovered);
    assert_eq!(analyzing.status, WorkItemStatus::CrawledOk);
    assert_eq!(crawling.retry_count, 1);
    assert_eq!(analyzing.retry_count, 1);
}

#[tokio::test]
async fn test_recovered_item_is_crawled_again() {
    let pipeline = pipeline().await;
    let item = claimed_for_crawl(&pipeline, "again.example.org").await;

    pipeline
        .recovery(Duration::from_secs(600))
        .startup_sweep()
        .await
        .unwrap();
    let report = pipeline.crawl_cycle().run_cycle().await.unwrap();

    assert_eq!(report.succeeded, 1);
    let reloaded = pipeline.items.find_by_id(item.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, WorkItemStatus::CrawledOk);
}

#[tokio::test]
async fn test_liveness_flags_idle_cycle() {
    let pipeline = pipeline().await;
    let now = Utc::now();
    pipeline
        .clock
        .record_at(Cycle::Crawl, now - chrono::Duration::minutes(10));
    pipeline.clock.record_at(Cycle::Analysis, now);

    let liveness = pipeline.recovery(Duration::from_secs(600)).check_liveness();

    assert!(liveness.crawl_stalled);
    assert!(!liveness.analysis_stalled);
    assert!(pipeline.clock.is_stalled(Cycle::Crawl));

    pipeline.clock.record(Cycle::Crawl);
    let liveness = pipeline.recovery(Duration::from_secs(600)).check_liveness();
    assert!(!liveness.crawl_stalled);
    assert!(!pipeline.clock.is_stalled(Cycle::Crawl));
}
