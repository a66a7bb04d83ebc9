// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;

/// 流水线周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cycle {
    Crawl,
    Analysis,
    Recovery,
}

impl Cycle {
    pub fn as_str(self) -> &'static str {
        match self {
            Cycle::Crawl => "crawl",
            Cycle::Analysis => "analysis",
            Cycle::Recovery => "recovery",
        }
    }
}

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct CycleState {
    last_run_at: Option<DateTime<Utc>>,
    stalled: bool,
}

/// 周期运行时钟
///
/// 记录进程启动时间、各周期最近一次运行时间以及恢复监控给出的
/// 停滞信号，由健康报告读取。
#[derive(Debug)]
pub struct CycleClock {
    started_at: DateTime<Utc>,
    cycles: RwLock<HashMap<Cycle, CycleState>>,
}

impl Default for CycleClock {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleClock {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            cycles: RwLock::new(HashMap::new()),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// 记录一次周期运行
    pub fn record(&self, cycle: Cycle) {
        self.record_at(cycle, Utc::now());
    }

    pub fn record_at(&self, cycle: Cycle, at: DateTime<Utc>) {
        self.cycles.write().entry(cycle).or_default().last_run_at = Some(at);
    }

    pub fn last_run_at(&self, cycle: Cycle) -> Option<DateTime<Utc>> {
        self.cycles.read().get(&cycle).and_then(|s| s.last_run_at)
    }

    /// 距离最近一次运行的秒数；从未运行时从进程启动算起
    pub fn seconds_since(&self, cycle: Cycle, now: DateTime<Utc>) -> i64 {
        let since = self.last_run_at(cycle).unwrap_or(self.started_at);
        (now - since).num_seconds().max(0)
    }

    pub fn set_stalled(&self, cycle: Cycle, stalled: bool) {
        self.cycles.write().entry(cycle).or_default().stalled = stalled;
    }

    pub fn is_stalled(&self, cycle: Cycle) -> bool {
        self.cycles.read().get(&cycle).is_some_and(|s| s.stalled)
    }
}
