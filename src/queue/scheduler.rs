// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::workers::worker::Worker;
use metrics::counter;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// 调度的周期任务
struct ScheduledJob {
    worker: Arc<dyn Worker>,
    period: Duration,
    max_concurrent_runs: u32,
    permits: Arc<Semaphore>,
    skipped: Arc<AtomicU64>,
}

/// 流水线调度器
///
/// 每个任务由独立的定时器驱动，信号量限制同一任务的重叠运行数。
/// 没有空闲名额的触发会被跳过并记录。
pub struct PipelineScheduler {
    jobs: Vec<ScheduledJob>,
    shutdown: watch::Sender<bool>,
    loops: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
}

impl Default for PipelineScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineScheduler {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            jobs: Vec::new(),
            shutdown,
            loops: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        }
    }

    /// 注册周期任务
    ///
    /// # 参数
    ///
    /// * `worker` - 每次触发时运行的工作器
    /// * `period` - 触发间隔
    /// * `max_concurrent_runs` - 同一任务允许的重叠运行数，至少为 1
    pub fn add_job(
        mut self,
        worker: Arc<dyn Worker>,
        period: Duration,
        max_concurrent_runs: u32,
    ) -> Self {
        let max_concurrent_runs = max_concurrent_runs.max(1);
        self.jobs.push(ScheduledJob {
            worker,
            period,
            max_concurrent_runs,
            permits: Arc::new(Semaphore::new(max_concurrent_runs as usize)),
            skipped: Arc::new(AtomicU64::new(0)),
        });
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 被跳过的触发次数
    pub fn skipped_ticks(&self, name: &str) -> u64 {
        self.jobs
            .iter()
            .filter(|job| job.worker.name() == name)
            .map(|job| job.skipped.load(Ordering::Relaxed))
            .sum()
    }

    /// 启动所有任务的定时循环；重复调用无效果
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.send_replace(false);

        let mut loops = self.loops.lock();
        for job in &self.jobs {
            info!(
                job = job.worker.name(),
                period_ms = job.period.as_millis() as u64,
                max_concurrent_runs = job.max_concurrent_runs,
                "Scheduling job"
            );
            loops.push(tokio::spawn(run_loop(
                job.worker.clone(),
                job.period,
                job.permits.clone(),
                job.skipped.clone(),
                self.shutdown.subscribe(),
            )));
        }
    }

    /// 停止调度
    ///
    /// 先停止发出新的触发，再等待所有运行中的任务结束。
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shutdown.send_replace(true);

        let loops = std::mem::take(&mut *self.loops.lock());
        for handle in loops {
            if let Err(e) = handle.await {
                error!(error = %e, "Scheduler loop ended abnormally");
            }
        }

        for job in &self.jobs {
            match job.permits.acquire_many(job.max_concurrent_runs).await {
                Ok(permits) => drop(permits),
                Err(e) => error!(job = job.worker.name(), error = %e, "Failed to drain job"),
            }
            debug!(job = job.worker.name(), "Job drained");
        }
        info!("Scheduler stopped");
    }
}

async fn run_loop(
    worker: Arc<dyn Worker>,
    period: Duration,
    permits: Arc<Semaphore>,
    skipped: Arc<AtomicU64>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let permit = match permits.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        skipped.fetch_add(1, Ordering::Relaxed);
                        counter!("pipeline_cycle_skipped_total", "cycle" => worker.name().to_string())
                            .increment(1);
                        warn!(job = worker.name(), "Previous runs still in progress, skipping tick");
                        continue;
                    }
                };

                let worker = worker.clone();
                tokio::spawn(async move {
                    if let Err(e) = worker.run().await {
                        error!(job = worker.name(), error = %e, "Job run failed");
                    }
                    drop(permit);
                });
            }
        }
    }
    debug!(job = worker.name(), "Scheduler loop exited");
}

#[cfg(test)]
#[path = "scheduler_test.rs"]
mod tests;
