// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::repositories::work_item_repository::WorkItemRepository;
use crate::workers::clock::{Cycle, CycleClock};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// 组件健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// 正常运行
    Operational,
    /// 运行但超过降级阈值未运行
    Degraded,
    /// 恢复监控判定停滞
    Stalled,
    /// 尚未运行过
    Unknown,
    /// 编排器未运行
    Stopped,
    /// 不可用
    Down,
}

/// 总体健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallHealth {
    Healthy,
    Degraded,
    Critical,
}

/// 单个组件的健康信息
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: &'static str,
    pub status: ComponentStatus,
    pub last_run_at: Option<DateTime<Utc>>,
    pub idle_seconds: Option<i64>,
}

/// 健康汇总
#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub overall: OverallHealth,
    pub components: Vec<ComponentHealth>,
    pub checked_at: DateTime<Utc>,
}

impl HealthSummary {
    pub fn component(&self, name: &str) -> Option<&ComponentHealth> {
        self.components.iter().find(|c| c.name == name)
    }
}

/// 降级阈值
#[derive(Debug, Clone, Copy)]
pub struct HealthThresholds {
    pub crawl_degraded: Duration,
    pub analysis_degraded: Duration,
    pub recovery_degraded: Duration,
}

/// 健康报告
///
/// 根据周期时钟中的最近运行时间与停滞信号，以及数据库连通性，
/// 给出各组件状态和总体状态。
pub struct HealthReporter {
    clock: Arc<CycleClock>,
    items: Arc<dyn WorkItemRepository>,
    thresholds: HealthThresholds,
}

impl HealthReporter {
    pub fn new(
        clock: Arc<CycleClock>,
        items: Arc<dyn WorkItemRepository>,
        thresholds: HealthThresholds,
    ) -> Self {
        Self {
            clock,
            items,
            thresholds,
        }
    }

    /// 生成健康汇总
    ///
    /// # 参数
    ///
    /// * `running` - 编排器是否在运行
    pub async fn report(&self, running: bool) -> HealthSummary {
        let database_up = match self.items.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Database health check failed");
                false
            }
        };
        self.evaluate_at(running, database_up, Utc::now())
    }

    /// 在给定时刻评估健康状态
    pub fn evaluate_at(
        &self,
        running: bool,
        database_up: bool,
        now: DateTime<Utc>,
    ) -> HealthSummary {
        let orchestrator = ComponentHealth {
            name: "orchestrator",
            status: if running {
                ComponentStatus::Operational
            } else {
                ComponentStatus::Stopped
            },
            last_run_at: None,
            idle_seconds: None,
        };
        let database = ComponentHealth {
            name: "database",
            status: if database_up {
                ComponentStatus::Operational
            } else {
                ComponentStatus::Down
            },
            last_run_at: None,
            idle_seconds: None,
        };

        let components = vec![
            orchestrator,
            self.cycle_health("crawl_loop", Cycle::Crawl, self.thresholds.crawl_degraded, running, now),
            self.cycle_health(
                "analysis_loop",
                Cycle::Analysis,
                self.thresholds.analysis_degraded,
                running,
                now,
            ),
            self.cycle_health(
                "recovery_monitor",
                Cycle::Recovery,
                self.thresholds.recovery_degraded,
                running,
                now,
            ),
            database,
        ];

        HealthSummary {
            overall: overall_of(&components),
            components,
            checked_at: now,
        }
    }

    fn cycle_health(
        &self,
        name: &'static str,
        cycle: Cycle,
        degraded_after: Duration,
        running: bool,
        now: DateTime<Utc>,
    ) -> ComponentHealth {
        let last_run_at = self.clock.last_run_at(cycle);
        let idle_seconds = last_run_at.map(|at| (now - at).num_seconds().max(0));

        let status = if !running {
            ComponentStatus::Stopped
        } else if self.clock.is_stalled(cycle) {
            ComponentStatus::Stalled
        } else {
            match idle_seconds {
                None => ComponentStatus::Unknown,
                Some(idle) if idle > degraded_after.as_secs() as i64 => ComponentStatus::Degraded,
                Some(_) => ComponentStatus::Operational,
            }
        };

        ComponentHealth {
            name,
            status,
            last_run_at,
            idle_seconds,
        }
    }
}

/// 数据库不可用、编排器停止或任一周期停滞为 critical；
/// 任一组件降级为 degraded。尚未运行过的周期不影响总体状态。
fn overall_of(components: &[ComponentHealth]) -> OverallHealth {
    let critical = components.iter().any(|c| {
        matches!(
            c.status,
            ComponentStatus::Down | ComponentStatus::Stalled
        ) || (c.name == "orchestrator" && c.status == ComponentStatus::Stopped)
    });
    if critical {
        return OverallHealth::Critical;
    }

    if components
        .iter()
        .any(|c| c.status == ComponentStatus::Degraded)
    {
        OverallHealth::Degraded
    } else {
        OverallHealth::Healthy
    }
}
