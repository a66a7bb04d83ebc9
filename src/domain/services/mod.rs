// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// 该模块包含不依赖具体技术实现的领域规则。
///
/// 包含的服务：
/// - 策略引擎（policy_engine）：基于域名后缀的放行/拦截判断
pub mod policy_engine;
