// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::repositories::work_item_repository::{RecoveredItem, WorkItemRepository};
use crate::utils::errors::{FailureKind, WorkerError};
use crate::workers::clock::{Cycle, CycleClock};
use crate::workers::worker::Worker;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use metrics::{counter, gauge};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 周期存活检查结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Liveness {
    pub crawl_stalled: bool,
    pub analysis_stalled: bool,
}

/// 恢复监控
///
/// 启动时回退所有遗留在活跃状态的工作项；运行中周期性回退
/// 超过停留阈值的工作项，并检查两个周期是否仍在运行。
pub struct RecoveryMonitor {
    items: Arc<dyn WorkItemRepository>,
    clock: Arc<CycleClock>,
    staleness_threshold: Duration,
    stall_threshold: Duration,
}

impl RecoveryMonitor {
    /// 创建恢复监控
    ///
    /// # 参数
    ///
    /// * `items` - 工作项仓库
    /// * `clock` - 周期运行时钟
    /// * `staleness_threshold` - 活跃状态最长停留时间
    /// * `stall_threshold` - 周期最长未运行时间
    pub fn new(
        items: Arc<dyn WorkItemRepository>,
        clock: Arc<CycleClock>,
        staleness_threshold: Duration,
        stall_threshold: Duration,
    ) -> Self {
        Self {
            items,
            clock,
            staleness_threshold,
            stall_threshold,
        }
    }

    /// 启动恢复
    ///
    /// 必须在调度器启动之前调用，此时任何活跃状态都是上一个进程遗留的。
    pub async fn startup_sweep(&self) -> Result<Vec<RecoveredItem>, WorkerError> {
        let recovered = self.items.roll_back_active(None).await?;
        self.report(&recovered, "startup");
        Ok(recovered)
    }

    /// 周期性扫描：回退停留过久的工作项
    pub async fn sweep(&self) -> Result<Vec<RecoveredItem>, WorkerError> {
        self.clock.record(Cycle::Recovery);

        let threshold = chrono::Duration::from_std(self.staleness_threshold)
            .map_err(|e| WorkerError::Internal(e.to_string()))?;
        let stale_before: DateTime<FixedOffset> = (Utc::now() - threshold).into();

        let recovered = self.items.roll_back_active(Some(stale_before)).await?;
        self.report(&recovered, "sweep");
        Ok(recovered)
    }

    /// 检查两个周期是否在停滞阈值内运行过
    ///
    /// 结果写入周期时钟供健康报告读取。
    pub fn check_liveness(&self) -> Liveness {
        let now = Utc::now();
        let limit = self.stall_threshold.as_secs() as i64;

        let mut liveness = Liveness::default();
        for cycle in [Cycle::Crawl, Cycle::Analysis] {
            let idle = self.clock.seconds_since(cycle, now);
            let stalled = idle > limit;
            if stalled {
                warn!(cycle = %cycle, idle_secs = idle, threshold_secs = limit, "Cycle appears stalled");
            }
            self.clock.set_stalled(cycle, stalled);
            gauge!("pipeline_cycle_stalled", "cycle" => cycle.as_str())
                .set(if stalled { 1.0 } else { 0.0 });

            match cycle {
                Cycle::Crawl => liveness.crawl_stalled = stalled,
                Cycle::Analysis => liveness.analysis_stalled = stalled,
                Cycle::Recovery => {}
            }
        }
        liveness
    }

    fn report(&self, recovered: &[RecoveredItem], trigger: &str) {
        for item in recovered {
            counter!("pipeline_recovered_items_total", "phase" => item.from.as_str())
                .increment(1);
            warn!(
                item_id = %item.id,
                domain = %item.domain,
                from = %item.from,
                to = %item.to,
                trigger,
                kind = %FailureKind::OrphanedActiveState,
                "Rolled back item"
            );
        }
        if !recovered.is_empty() {
            info!(count = recovered.len(), trigger, "Recovery finished");
        }
    }
}

#[async_trait]
impl Worker for RecoveryMonitor {
    async fn run(&self) -> Result<(), WorkerError> {
        let swept = self.sweep().await;
        self.check_liveness();
        swept.map(|_| ())
    }

    fn name(&self) -> &str {
        "recovery_monitor"
    }
}
