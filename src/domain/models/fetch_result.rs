// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 抓取结果
///
/// 每个工作项至多一条，首次尝试抓取时创建，重新抓取时覆盖。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResult {
    /// 所属工作项ID
    pub item_id: Uuid,
    /// 请求的URL
    pub url: String,
    /// 抓取内容在内容存储中的位置，失败时为空
    pub content_location: Option<String>,
    /// 原始HTTP状态码，网络层失败时为空
    pub raw_status: Option<i32>,
    /// 错误描述
    pub error: Option<String>,
    /// 抓取时间
    pub fetched_at: DateTime<FixedOffset>,
}

/// 一次抓取的结局，由抓取周期写入
#[derive(Debug, Clone)]
pub enum CrawlOutcome {
    /// 抓取成功，内容已保存
    Succeeded {
        url: String,
        content_location: String,
        raw_status: Option<i32>,
    },
    /// 抓取失败（包括内容过短）
    Failed {
        url: String,
        raw_status: Option<i32>,
        error: String,
    },
}

impl CrawlOutcome {
    /// 是否成功
    pub fn is_success(&self) -> bool {
        matches!(self, CrawlOutcome::Succeeded { .. })
    }
}
