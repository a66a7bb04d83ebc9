// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::MetricsSettings;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{info, warn};

/// 初始化指标系统
///
/// 配置启用时安装 Prometheus HTTP 导出器，并注册流水线指标的描述。
/// 地址被占用时只记录警告，流水线照常运行。
pub fn init_metrics(settings: &MetricsSettings) {
    if !settings.enabled {
        info!("Metrics exporter disabled");
        return;
    }

    let addr: SocketAddr = match settings.listen_addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!(addr = %settings.listen_addr, error = %e, "Invalid metrics listen address");
            return;
        }
    };

    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        warn!("Failed to install Prometheus recorder: {}. This might happen if the port is already in use.", e);
        return;
    }

    describe_pipeline_metrics();
    info!("Metrics exporter listening on {}", addr);
}

fn describe_pipeline_metrics() {
    describe_counter!(
        "pipeline_items_claimed_total",
        "Work items claimed into an active state"
    );
    describe_counter!(
        "pipeline_items_blocked_total",
        "Work items moved to BLOCKED by the domain policy"
    );
    describe_counter!(
        "pipeline_crawl_outcomes_total",
        "Crawl outcomes by result (ok, fail, discarded)"
    );
    describe_counter!(
        "pipeline_analysis_outcomes_total",
        "Analysis outcomes by result (ok, fail, timeout, discarded)"
    );
    describe_counter!(
        "pipeline_recovered_items_total",
        "Work items rolled back by the recovery monitor, by phase"
    );
    describe_counter!(
        "pipeline_cycle_skipped_total",
        "Scheduler ticks skipped because the overlap limit was reached"
    );
    describe_counter!(
        "pipeline_knowledge_index_failures_total",
        "Best-effort knowledge index calls that failed"
    );
    describe_histogram!(
        "pipeline_cycle_duration_seconds",
        "Duration of one cycle invocation in seconds"
    );
    describe_gauge!(
        "pipeline_cycle_stalled",
        "1 when a cycle has not run within the stall threshold"
    );
}
