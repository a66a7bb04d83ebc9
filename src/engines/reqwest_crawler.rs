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

use crate::config::settings::CrawlerSettings;
use crate::engines::traits::{Crawler, CrawlerError, FetchResponse};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::debug;

/// 抓取器
///
/// 基于reqwest实现的基本HTTP抓取器。网络层失败转换为失败的
/// `FetchResponse`，只有客户端构建失败才返回错误。
pub struct ReqwestCrawler {
    client: reqwest::Client,
}

impl ReqwestCrawler {
    /// 创建抓取器
    ///
    /// # 参数
    ///
    /// * `settings` - 抓取器配置
    ///
    /// # 返回值
    ///
    /// * `Ok(ReqwestCrawler)` - 抓取器
    /// * `Err(CrawlerError)` - 客户端构建失败
    pub fn new(settings: &CrawlerSettings) -> Result<Self, CrawlerError> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Crawler for ReqwestCrawler {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, CrawlerError> {
        let start = Instant::now();
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                let kind = if e.is_timeout() {
                    "timeout"
                } else if e.is_connect() {
                    "connect error"
                } else {
                    "request error"
                };
                return Ok(FetchResponse::failure(None, format!("{}: {}", kind, e)));
            }
        };

        let status = response.status();
        let content = match response.text().await {
            Ok(content) => content,
            Err(e) => {
                return Ok(FetchResponse::failure(
                    Some(status.as_u16()),
                    format!("Failed to read body: {}", e),
                ))
            }
        };

        debug!(
            url,
            status = status.as_u16(),
            bytes = content.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Fetched"
        );

        if status.is_success() {
            Ok(FetchResponse::success(status.as_u16(), content))
        } else {
            Ok(FetchResponse {
                ok: false,
                content: Some(content),
                raw_status: Some(status.as_u16()),
                error: Some(format!("HTTP {}", status)),
            })
        }
    }
}

#[cfg(test)]
#[path = "reqwest_crawler_test.rs"]
mod tests;
