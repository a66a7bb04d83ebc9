// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::domain::models::classification::{CategoryHints, Classification};
use async_trait::async_trait;
use thiserror::Error;

/// 抓取器错误类型
#[derive(Error, Debug)]
pub enum CrawlerError {
    /// 请求失败
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    /// 其他错误
    #[error("Other error: {0}")]
    Other(String),
}

/// 分类器错误类型
#[derive(Error, Debug)]
pub enum AnalyzerError {
    /// 请求失败
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    /// 服务返回错误状态
    #[error("Analyzer returned error: {status} - {body}")]
    Status { status: u16, body: String },
    /// 无法解析模型输出
    #[error("Failed to parse analyzer output: {0}")]
    Parse(String),
}

/// 知识库错误类型
#[derive(Error, Debug)]
pub enum KnowledgeError {
    /// 请求失败
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    /// 服务返回错误状态
    #[error("Knowledge store returned error: {0}")]
    Status(u16),
}

/// 抓取响应
#[derive(Debug, Clone, Default)]
pub struct FetchResponse {
    /// 是否成功
    pub ok: bool,
    /// 页面文本内容
    pub content: Option<String>,
    /// 原始HTTP状态码
    pub raw_status: Option<u16>,
    /// 错误描述
    pub error: Option<String>,
}

impl FetchResponse {
    pub fn success(status: u16, content: impl Into<String>) -> Self {
        Self {
            ok: true,
            content: Some(content.into()),
            raw_status: Some(status),
            error: None,
        }
    }

    pub fn failure(status: Option<u16>, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            content: None,
            raw_status: status,
            error: Some(error.into()),
        }
    }
}

/// 页面抓取器特质
///
/// 内容过短由调用方判定为失败。
#[async_trait]
pub trait Crawler: Send + Sync {
    /// 抓取URL
    ///
    /// # 参数
    ///
    /// * `url` - 目标URL
    ///
    /// # 返回值
    ///
    /// * `Ok(FetchResponse)` - 抓取结果（可能是失败的响应）
    /// * `Err(CrawlerError)` - 抓取器本身出错
    async fn fetch(&self, url: &str) -> Result<FetchResponse, CrawlerError>;
}

/// 内容分类器特质
///
/// 返回 `None` 表示没有得到结论，超时由调用方控制。
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn classify(
        &self,
        domain: &str,
        content: &str,
        category_hints: &CategoryHints,
    ) -> Result<Option<Classification>, AnalyzerError>;

    /// 模型名称，用于健康检查和日志
    fn model_name(&self) -> &str;
}

/// 知识库特质
///
/// 索引是尽力而为的，失败不影响工作项状态。
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    async fn index(
        &self,
        domain: &str,
        text: &str,
        category: &str,
        malicious: bool,
    ) -> Result<(), KnowledgeError>;
}
