// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 协作方模块
///
/// 定义抓取器、分类器和知识库的特质，以及基于HTTP的默认实现
pub mod knowledge_store;
pub mod llm_analyzer;
pub mod reqwest_crawler;
pub mod traits;
