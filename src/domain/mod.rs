// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域层模块
///
/// 该模块包含系统的核心业务逻辑，包括：
/// - 领域模型（models）：工作项、抓取结果、分类结果、审计日志和策略规则
/// - 仓库接口（repositories）：数据持久化抽象接口
/// - 服务（services）：领域服务和业务规则
///
/// 领域层不依赖于任何外部实现。
pub mod models;
pub mod repositories;
pub mod services;
