// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{
    force_status, malicious_verdict, test_settings, AnalyzerBehavior, MockAnalyzer, MockCrawler,
    TestPipeline,
};
use domain_intel::application::health::OverallHealth;
use domain_intel::application::orchestrator::{OrchestratorError, SubmitOutcome};
use domain_intel::domain::models::policy_rule::RuleType;
use domain_intel::domain::models::work_item::WorkItemStatus;
use domain_intel::domain::repositories::policy_rule_repository::PolicyRuleRepository;
use domain_intel::domain::repositories::work_item_repository::WorkItemRepository;
use domain_intel::domain::services::policy_engine::PolicySnapshot;
use domain_intel::engines::traits::FetchResponse;
use std::time::Duration;

#[tokio::test]
async fn test_submit_normalizes_and_reports_duplicates() {
    let pipeline = TestPipeline::new(
        MockCrawler::new(),
        MockAnalyzer::new(AnalyzerBehavior::Nothing),
    )
    .await;
    let orchestrator = pipeline.orchestrator(&test_settings());

    let first = orchestrator
        .submit("Example.COM", "manual", 3)
        .await
        .unwrap();
    assert!(matches!(first, SubmitOutcome::Created(_)));
    assert_eq!(first.item().domain, "example.com");

    let second = orchestrator
        .submit("https://example.com/login", "feed", 1)
        .await
        .unwrap();
    assert!(second.is_duplicate());
    assert_eq!(second.item().id, first.item().id);
    assert_eq!(second.item().priority, 3);

    let invalid = orchestrator.submit("", "manual", 3).await;
    assert!(matches!(invalid, Err(OrchestratorError::InvalidDomain(_))));

    let logs = orchestrator.recent_logs(10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].stage, "INGEST");
}

#[tokio::test]
async fn test_reclassify_failures_is_idempotent() {
    let crawler = MockCrawler::new();
    crawler.respond(
        "broken.example.org",
        FetchResponse::failure(Some(500), "HTTP 500"),
    );
    let pipeline = TestPipeline::new(crawler, MockAnalyzer::new(AnalyzerBehavior::Nothing)).await;
    let orchestrator = pipeline.orchestrator(&test_settings());

    let broken = orchestrator
        .submit("broken.example.org", "feed", 3)
        .await
        .unwrap();
    let unclear = orchestrator
        .submit("unclear.example.org", "feed", 3)
        .await
        .unwrap();
    let lost = orchestrator
        .submit("lost.example.org", "feed", 3)
        .await
        .unwrap();
    force_status(&pipeline.db, lost.item().id, WorkItemStatus::AnalysisFail).await;

    pipeline.crawl_cycle().run_cycle().await.unwrap();
    pipeline
        .analysis_cycle(Duration::from_secs(5))
        .run_cycle()
        .await
        .unwrap();

    let summary = orchestrator.reclassify_failures().await.unwrap();
    assert_eq!(summary.crawl_failures_requeued, 1);
    assert_eq!(summary.analysis_failures_reanalyzed, 1);
    assert_eq!(summary.analysis_failures_requeued, 1);

    let status = |id: uuid::Uuid| {
        let items = pipeline.items.clone();
        async move { items.find_by_id(id).await.unwrap().unwrap().status }
    };
    assert_eq!(status(broken.item().id).await, WorkItemStatus::Queued);
    assert_eq!(status(unclear.item().id).await, WorkItemStatus::CrawledOk);
    assert_eq!(status(lost.item().id).await, WorkItemStatus::Queued);

    let again = orchestrator.reclassify_failures().await.unwrap();
    assert_eq!(again.total(), 0);
}

#[tokio::test]
async fn test_archive_requires_completed() {
    let pipeline = TestPipeline::new(
        MockCrawler::new(),
        MockAnalyzer::new(AnalyzerBehavior::Answer(malicious_verdict())),
    )
    .await;
    let orchestrator = pipeline.orchestrator(&test_settings());
    orchestrator
        .submit("archive.example.org", "feed", 3)
        .await
        .unwrap();

    let early = orchestrator.archive("archive.example.org").await;
    assert!(matches!(
        early,
        Err(OrchestratorError::NotArchivable {
            status: WorkItemStatus::Discovered,
            ..
        })
    ));

    pipeline.crawl_cycle().run_cycle().await.unwrap();
    pipeline
        .analysis_cycle(Duration::from_secs(5))
        .run_cycle()
        .await
        .unwrap();

    let archived = orchestrator.archive("archive.example.org").await.unwrap();
    assert_eq!(archived.status, WorkItemStatus::Archived);

    let missing = orchestrator.archive("nowhere.example.org").await;
    assert!(matches!(missing, Err(OrchestratorError::NotFound(_))));
}

#[tokio::test]
async fn test_stats_and_bottlenecks() {
    let pipeline = TestPipeline::new(
        MockCrawler::new(),
        MockAnalyzer::new(AnalyzerBehavior::Nothing),
    )
    .await;
    let orchestrator = pipeline.orchestrator(&test_settings());
    orchestrator.submit("a.example.org", "feed", 3).await.unwrap();
    orchestrator.submit("b.example.org", "feed", 3).await.unwrap();
    orchestrator.submit("c.example.org", "feed", 3).await.unwrap();

    pipeline
        .items
        .claim_crawl_batch(2, &PolicySnapshot::empty())
        .await
        .unwrap();

    let stats = orchestrator.pipeline_stats().await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.count(WorkItemStatus::Crawling), 2);
    assert_eq!(stats.count(WorkItemStatus::Discovered), 1);

    let fresh = orchestrator
        .bottlenecks(Duration::from_secs(600))
        .await
        .unwrap();
    assert_eq!(fresh.stuck_crawling, 0);
    assert!(fresh.samples.is_empty());

    tokio::time::sleep(Duration::from_millis(20)).await;
    let stuck = orchestrator.bottlenecks(Duration::ZERO).await.unwrap();
    assert_eq!(stuck.stuck_crawling, 2);
    assert_eq!(stuck.stuck_analyzing, 0);
    assert_eq!(stuck.samples.len(), 2);
}

#[tokio::test]
async fn test_reload_policies_applies_new_rules() {
    let pipeline = TestPipeline::new(
        MockCrawler::new(),
        MockAnalyzer::new(AnalyzerBehavior::Nothing),
    )
    .await;
    let orchestrator = pipeline.orchestrator(&test_settings());

    assert_eq!(orchestrator.reload_policies().await.unwrap(), (0, 0));
    assert!(!pipeline.policy.is_blocked("tracker.example.net"));

    pipeline
        .rules
        .create("*.example.net", RuleType::Deny, Some("trackers".to_string()))
        .await
        .unwrap();
    assert_eq!(orchestrator.reload_policies().await.unwrap(), (0, 1));
    assert!(pipeline.policy.is_blocked("tracker.example.net"));
}

#[tokio::test]
async fn test_running_pipeline_completes_submitted_domain() {
    let pipeline = TestPipeline::new(
        MockCrawler::new(),
        MockAnalyzer::new(AnalyzerBehavior::Answer(malicious_verdict())),
    )
    .await;
    let orchestrator = pipeline.orchestrator(&test_settings());
    let submitted = orchestrator
        .submit("live.example.org", "feed", 2)
        .await
        .unwrap();

    assert!(!orchestrator.status().running);
    orchestrator.start().await.unwrap();
    assert!(orchestrator.status().running);

    let mut status = WorkItemStatus::Discovered;
    for _ in 0..50 {
        status = pipeline
            .items
            .find_by_id(submitted.item().id)
            .await
            .unwrap()
            .unwrap()
            .status;
        if status == WorkItemStatus::Completed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(status, WorkItemStatus::Completed);

    let report = orchestrator.status();
    assert!(report.last_crawl_run_at.is_some());
    assert!(report.last_analysis_run_at.is_some());
    assert_eq!(report.batch_sizes.crawl, 30);

    let health = orchestrator.health().await;
    assert_ne!(health.overall, OverallHealth::Critical);

    orchestrator.stop().await;
    assert!(!orchestrator.status().running);
    assert_eq!(orchestrator.health().await.overall, OverallHealth::Critical);
    assert_eq!(pipeline.knowledge.indexed().len(), 1);
}

#[tokio::test]
async fn test_start_recovers_orphaned_items() {
    let pipeline = TestPipeline::new(
        MockCrawler::new(),
        MockAnalyzer::new(AnalyzerBehavior::Nothing),
    )
    .await;
    let orchestrator = pipeline.orchestrator(&test_settings());
    orchestrator
        .submit("orphan.example.org", "feed", 3)
        .await
        .unwrap();
    pipeline
        .items
        .claim_crawl_batch(10, &PolicySnapshot::empty())
        .await
        .unwrap();

    let recovered = orchestrator.start().await.unwrap();
    orchestrator.stop().await;

    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0].domain, "orphan.example.org");
}
