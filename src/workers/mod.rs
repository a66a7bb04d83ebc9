// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工作器模块
///
/// 调度器驱动的流水线周期：
/// - 抓取周期（crawl_cycle）
/// - 分析周期（analysis_cycle）
/// - 恢复监控（recovery_monitor）
pub mod analysis_cycle;
pub mod clock;
pub mod crawl_cycle;
pub mod recovery_monitor;
pub mod worker;

pub use worker::Worker;
