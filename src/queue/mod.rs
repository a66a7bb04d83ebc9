// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 调度模块
///
/// 按固定间隔触发流水线周期，并限制重叠运行数
pub mod scheduler;
