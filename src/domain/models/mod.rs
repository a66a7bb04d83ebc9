// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// 该模块定义了流水线的核心业务实体，包括：
/// - 工作项（work_item）：以域名标识的工作单元及其状态机
/// - 抓取结果（fetch_result）：抓取阶段的产出
/// - 分类结果（classification）：分析阶段的产出
/// - 审计日志（audit_log）：只追加的处理记录
/// - 策略规则（policy_rule）：域名放行/拦截规则
pub mod audit_log;
pub mod classification;
pub mod fetch_result;
pub mod policy_rule;
pub mod work_item;
