// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 应用程序模块
///
/// 编排器上下文、健康报告和管理操作
pub mod application;

/// 配置模块
///
/// 处理应用程序的配置设置和环境变量
pub mod config;

/// 领域模块
///
/// 包含核心业务实体、服务和仓库接口
pub mod domain;

/// 引擎模块
///
/// 抓取器、分类器和知识库的协作方接口及默认适配器
pub mod engines;

/// 基础设施模块
///
/// 提供数据库、内容存储和指标导出
pub mod infrastructure;

/// 队列模块
///
/// 周期任务调度
pub mod queue;

/// 工具模块
///
/// 提供通用的工具函数和辅助功能
pub mod utils;

/// 工作器模块
///
/// 抓取、分析和恢复周期
pub mod workers;
