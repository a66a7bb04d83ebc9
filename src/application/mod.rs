// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 应用层
///
/// 编排器上下文与健康报告，对外提供流水线的管理操作
pub mod health;
pub mod orchestrator;
