// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{
    malicious_verdict, AnalyzerBehavior, MockAnalyzer, MockCrawler, MockKnowledgeStore,
    TestPipeline,
};
use domain_intel::domain::models::policy_rule::RuleType;
use domain_intel::domain::models::work_item::{WorkItem, WorkItemStatus};
use domain_intel::domain::repositories::audit_log_repository::AuditLogRepository;
use domain_intel::domain::repositories::policy_rule_repository::PolicyRuleRepository;
use domain_intel::domain::repositories::work_item_repository::WorkItemRepository;
use domain_intel::engines::traits::FetchResponse;
use std::time::Duration;

async fn submit(pipeline: &TestPipeline, domain: &str, priority: i32) -> WorkItem {
    let item = WorkItem::new(domain.to_string(), "feed".to_string(), priority);
    pipeline.items.create_if_absent(&item).await.unwrap().unwrap()
}

async fn status_of(pipeline: &TestPipeline, item: &WorkItem) -> WorkItemStatus {
    pipeline
        .items
        .find_by_id(item.id)
        .await
        .unwrap()
        .unwrap()
        .status
}

async fn stages_of(pipeline: &TestPipeline, item: &WorkItem) -> Vec<String> {
    pipeline
        .audit
        .find_by_item(item.id)
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.stage)
        .collect()
}

#[tokio::test]
async fn test_phishing_domain_flows_to_completed() {
    let pipeline = TestPipeline::new(
        MockCrawler::new(),
        MockAnalyzer::new(AnalyzerBehavior::Answer(malicious_verdict())),
    )
    .await;
    let item = submit(&pipeline, "phish.example.org", 2).await;

    let crawl = pipeline.crawl_cycle().run_cycle().await.unwrap();
    assert_eq!(crawl.claimed, 1);
    assert_eq!(crawl.succeeded, 1);
    assert_eq!(status_of(&pipeline, &item).await, WorkItemStatus::CrawledOk);

    let fetch = pipeline
        .items
        .find_fetch_result(item.id)
        .await
        .unwrap()
        .unwrap();
    assert!(fetch.content_location.is_some());
    assert_eq!(fetch.url, "https://phish.example.org");

    let analysis = pipeline
        .analysis_cycle(Duration::from_secs(5))
        .run_cycle()
        .await
        .unwrap();
    assert_eq!(analysis.completed, 1);
    assert_eq!(status_of(&pipeline, &item).await, WorkItemStatus::Completed);

    let stored = pipeline
        .items
        .find_classification(item.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.classification.category, "Malicious");
    assert!(stored.classification.malicious);
    assert!((stored.classification.confidence - 0.92).abs() < f64::EPSILON);

    assert_eq!(
        pipeline.knowledge.indexed(),
        vec![(
            "phish.example.org".to_string(),
            "Malicious".to_string(),
            true
        )]
    );
    assert_eq!(pipeline.analyzer.calls(), 1);
}

#[tokio::test]
async fn test_completed_item_is_not_reanalyzed() {
    let pipeline = TestPipeline::new(
        MockCrawler::new(),
        MockAnalyzer::new(AnalyzerBehavior::Answer(malicious_verdict())),
    )
    .await;
    let item = submit(&pipeline, "done.example.org", 3).await;

    pipeline.crawl_cycle().run_cycle().await.unwrap();
    let analysis = pipeline.analysis_cycle(Duration::from_secs(5));
    analysis.run_cycle().await.unwrap();
    let second = analysis.run_cycle().await.unwrap();

    assert_eq!(second.claimed, 0);
    assert_eq!(pipeline.analyzer.calls(), 1);
    assert_eq!(pipeline.knowledge.indexed().len(), 1);
    assert_eq!(status_of(&pipeline, &item).await, WorkItemStatus::Completed);
}

#[tokio::test]
async fn test_denied_suffix_blocks_without_fetch() {
    let pipeline = TestPipeline::new(
        MockCrawler::new(),
        MockAnalyzer::new(AnalyzerBehavior::Nothing),
    )
    .await;
    pipeline
        .rules
        .create("doubleclick.net", RuleType::Deny, None)
        .await
        .unwrap();
    let item = submit(&pipeline, "ads.doubleclick.net", 3).await;

    let report = pipeline.crawl_cycle().run_cycle().await.unwrap();

    assert_eq!(report.blocked, 1);
    assert_eq!(report.claimed, 0);
    assert_eq!(pipeline.crawler.calls(), 0);
    assert_eq!(status_of(&pipeline, &item).await, WorkItemStatus::Blocked);
    assert_eq!(stages_of(&pipeline, &item).await, vec!["POLICY".to_string()]);
}

#[tokio::test]
async fn test_allow_rule_overrides_deny() {
    let pipeline = TestPipeline::new(
        MockCrawler::new(),
        MockAnalyzer::new(AnalyzerBehavior::Nothing),
    )
    .await;
    pipeline
        .rules
        .create("example.com", RuleType::Deny, None)
        .await
        .unwrap();
    pipeline
        .rules
        .create("safe.example.com", RuleType::Allow, None)
        .await
        .unwrap();
    let safe = submit(&pipeline, "safe.example.com", 3).await;
    let evil = submit(&pipeline, "evil.example.com", 3).await;

    pipeline.crawl_cycle().run_cycle().await.unwrap();

    assert_eq!(status_of(&pipeline, &safe).await, WorkItemStatus::CrawledOk);
    assert_eq!(status_of(&pipeline, &evil).await, WorkItemStatus::Blocked);
    assert_eq!(pipeline.crawler.calls(), 1);
}

#[tokio::test]
async fn test_concurrent_cycles_claim_once() {
    let pipeline = TestPipeline::new(
        MockCrawler::with_delay(Duration::from_millis(100)),
        MockAnalyzer::new(AnalyzerBehavior::Nothing),
    )
    .await;
    let item = submit(&pipeline, "race.example.org", 3).await;

    let first = pipeline.crawl_cycle();
    let second = pipeline.crawl_cycle();
    let (a, b) = tokio::join!(first.run_cycle(), second.run_cycle());
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.claimed + b.claimed, 1);
    assert_eq!(pipeline.crawler.calls(), 1);
    assert_eq!(status_of(&pipeline, &item).await, WorkItemStatus::CrawledOk);
}

#[tokio::test]
async fn test_short_content_is_crawl_failure() {
    let crawler = MockCrawler::new();
    crawler.respond("tiny.example.org", FetchResponse::success(200, "hello"));
    crawler.respond(
        "down.example.org",
        FetchResponse::failure(Some(503), "HTTP 503"),
    );
    let pipeline = TestPipeline::new(crawler, MockAnalyzer::new(AnalyzerBehavior::Nothing)).await;
    let tiny = submit(&pipeline, "tiny.example.org", 3).await;
    let down = submit(&pipeline, "down.example.org", 3).await;

    let report = pipeline.crawl_cycle().run_cycle().await.unwrap();

    assert_eq!(report.failed, 2);
    assert_eq!(status_of(&pipeline, &tiny).await, WorkItemStatus::CrawledFail);
    assert_eq!(status_of(&pipeline, &down).await, WorkItemStatus::CrawledFail);

    let fetch = pipeline
        .items
        .find_fetch_result(down.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetch.raw_status, Some(503));
    assert!(fetch.content_location.is_none());
    assert_eq!(stages_of(&pipeline, &tiny).await, vec!["CRAWLER".to_string()]);
}

#[tokio::test]
async fn test_hung_analyzer_times_out_once() {
    let pipeline = TestPipeline::new(
        MockCrawler::new(),
        MockAnalyzer::new(AnalyzerBehavior::Hang),
    )
    .await;
    let item = submit(&pipeline, "slow.example.org", 3).await;
    pipeline.crawl_cycle().run_cycle().await.unwrap();

    let report = pipeline
        .analysis_cycle(Duration::from_millis(100))
        .run_cycle()
        .await
        .unwrap();
    assert_eq!(report.timed_out, 1);
    assert_eq!(status_of(&pipeline, &item).await, WorkItemStatus::AnalysisFail);

    // 恢复扫描不会再为同一次超时写记录
    tokio::time::sleep(Duration::from_millis(20)).await;
    let recovered = pipeline.recovery(Duration::ZERO).sweep().await.unwrap();
    assert!(recovered.is_empty());

    let timeouts = stages_of(&pipeline, &item)
        .await
        .into_iter()
        .filter(|stage| stage == "ANALYZER_TIMEOUT")
        .count();
    assert_eq!(timeouts, 1);
}

#[tokio::test]
async fn test_empty_analysis_is_failure() {
    let pipeline = TestPipeline::new(
        MockCrawler::new(),
        MockAnalyzer::new(AnalyzerBehavior::Nothing),
    )
    .await;
    let item = submit(&pipeline, "quiet.example.org", 3).await;
    pipeline.crawl_cycle().run_cycle().await.unwrap();

    let report = pipeline
        .analysis_cycle(Duration::from_secs(5))
        .run_cycle()
        .await
        .unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(status_of(&pipeline, &item).await, WorkItemStatus::AnalysisFail);
    assert!(stages_of(&pipeline, &item)
        .await
        .contains(&"ANALYZER".to_string()));
    assert!(pipeline.knowledge.indexed().is_empty());
}

#[tokio::test]
async fn test_knowledge_failure_keeps_completed() {
    let pipeline = TestPipeline::with_knowledge(
        MockCrawler::new(),
        MockAnalyzer::new(AnalyzerBehavior::Answer(malicious_verdict())),
        MockKnowledgeStore::failing(),
    )
    .await;
    let item = submit(&pipeline, "kb.example.org", 3).await;
    pipeline.crawl_cycle().run_cycle().await.unwrap();

    let report = pipeline
        .analysis_cycle(Duration::from_secs(5))
        .run_cycle()
        .await
        .unwrap();

    assert_eq!(report.completed, 1);
    assert_eq!(status_of(&pipeline, &item).await, WorkItemStatus::Completed);
    assert!(stages_of(&pipeline, &item)
        .await
        .contains(&"KNOWLEDGE".to_string()));
}

#[tokio::test]
async fn test_higher_priority_crawled_first() {
    let pipeline = TestPipeline::new(
        MockCrawler::new(),
        MockAnalyzer::new(AnalyzerBehavior::Nothing),
    )
    .await;
    let low = submit(&pipeline, "low.example.org", 5).await;
    let high = submit(&pipeline, "high.example.org", 1).await;

    let cycle = domain_intel::workers::crawl_cycle::CrawlCycle::new(
        pipeline.items.clone(),
        pipeline.policy.clone(),
        pipeline.crawler.clone(),
        pipeline.content.clone(),
        pipeline.clock.clone(),
        domain_intel::workers::crawl_cycle::CrawlCycleConfig {
            batch_size: 1,
            min_content_length: 50,
            scheme: "https".to_string(),
        },
    );
    cycle.run_cycle().await.unwrap();

    assert_eq!(status_of(&pipeline, &high).await, WorkItemStatus::CrawledOk);
    assert_eq!(status_of(&pipeline, &low).await, WorkItemStatus::Discovered);
}

#[tokio::test]
async fn test_stale_crawl_result_does_not_complete_a_newer_claim() {
    let pipeline = TestPipeline::new(
        MockCrawler::with_delay(Duration::from_millis(400)),
        MockAnalyzer::new(AnalyzerBehavior::Nothing),
    )
    .await;
    let item = submit(&pipeline, "reclaimed.example.org", 3).await;

    let first = pipeline.crawl_cycle();
    let first = tokio::spawn(async move { first.run_cycle().await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let recovered = pipeline.recovery(Duration::ZERO).sweep().await.unwrap();
    assert_eq!(recovered.len(), 1);

    let second = pipeline.crawl_cycle();
    let second = tokio::spawn(async move { second.run_cycle().await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(status_of(&pipeline, &item).await, WorkItemStatus::Crawling);

    let stale = first.await.unwrap().unwrap();
    assert_eq!(stale.discarded, 1);
    assert_eq!(stale.succeeded, 0);
    assert_eq!(status_of(&pipeline, &item).await, WorkItemStatus::Crawling);

    let current = second.await.unwrap().unwrap();
    assert_eq!(current.succeeded, 1);
    assert_eq!(current.discarded, 0);
    assert_eq!(status_of(&pipeline, &item).await, WorkItemStatus::CrawledOk);
    assert_eq!(pipeline.crawler.calls(), 2);
}

#[tokio::test]
async fn test_stale_verdict_does_not_complete_a_newer_claim() {
    let pipeline = TestPipeline::new(
        MockCrawler::new(),
        MockAnalyzer::new(AnalyzerBehavior::Slow(
            Duration::from_millis(400),
            malicious_verdict(),
        )),
    )
    .await;
    let item = submit(&pipeline, "reanalyzed.example.org", 3).await;
    pipeline.crawl_cycle().run_cycle().await.unwrap();

    let first = pipeline.analysis_cycle(Duration::from_secs(5));
    let first = tokio::spawn(async move { first.run_cycle().await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let recovered = pipeline.recovery(Duration::ZERO).sweep().await.unwrap();
    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0].to, WorkItemStatus::CrawledOk);

    let second = pipeline.analysis_cycle(Duration::from_secs(5));
    let second = tokio::spawn(async move { second.run_cycle().await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(status_of(&pipeline, &item).await, WorkItemStatus::Analyzing);

    let stale = first.await.unwrap().unwrap();
    assert_eq!(stale.discarded, 1);
    assert_eq!(stale.completed, 0);
    assert_eq!(status_of(&pipeline, &item).await, WorkItemStatus::Analyzing);
    assert!(pipeline.knowledge.indexed().is_empty());

    let current = second.await.unwrap().unwrap();
    assert_eq!(current.completed, 1);
    assert_eq!(status_of(&pipeline, &item).await, WorkItemStatus::Completed);
    assert_eq!(pipeline.analyzer.calls(), 2);
    assert_eq!(pipeline.knowledge.indexed().len(), 1);
}

#[tokio::test]
async fn test_hanging_knowledge_store_does_not_hold_the_cycle() {
    let pipeline = TestPipeline::with_knowledge(
        MockCrawler::new(),
        MockAnalyzer::new(AnalyzerBehavior::Answer(malicious_verdict())),
        MockKnowledgeStore::hanging(),
    )
    .await;
    let item = submit(&pipeline, "slow-kb.example.org", 3).await;
    pipeline.crawl_cycle().run_cycle().await.unwrap();

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        pipeline.analysis_cycle(Duration::from_secs(5)).run_cycle(),
    )
    .await
    .expect("analysis cycle should not wait on the knowledge store")
    .unwrap();

    assert_eq!(report.completed, 1);
    assert_eq!(status_of(&pipeline, &item).await, WorkItemStatus::Completed);
    assert!(stages_of(&pipeline, &item)
        .await
        .contains(&"KNOWLEDGE".to_string()));
}
