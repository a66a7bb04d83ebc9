// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库接口模块
///
/// 该模块定义了领域层的仓库接口，具体实现由基础设施层提供。
///
/// 包含的仓库接口：
/// - 工作项仓库（work_item_repository）：状态机的持久化与认领
/// - 审计日志仓库（audit_log_repository）：只追加的处理记录
/// - 策略规则仓库（policy_rule_repository）：域名放行/拦截规则
/// - 分类定义仓库（category_repository）：分类提示
/// - 内容存储（storage_repository）：抓取内容的保存与读取
pub mod audit_log_repository;
pub mod category_repository;
pub mod policy_rule_repository;
pub mod storage_repository;
pub mod work_item_repository;
