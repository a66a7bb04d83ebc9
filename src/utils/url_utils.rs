// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::work_item::DomainError;
use chrono::{DateTime, Utc};
use url::{Host, Url};

/// 规范化域名
///
/// 去除首尾空白和末尾的点并转为小写。输入也可以是完整URL，
/// 此时取其主机部分。IP地址和空值会被拒绝。
///
/// # 参数
///
/// * `input` - 原始输入
///
/// # 返回值
///
/// * `Ok(String)` - 规范化后的域名
/// * `Err(DomainError)` - 不是有效的域名
pub fn normalize_domain(input: &str) -> Result<String, DomainError> {
    let trimmed = input.trim();
    let invalid = || DomainError::InvalidDomain(input.to_string());

    let host = if trimmed.contains("://") {
        let url = Url::parse(trimmed).map_err(|_| invalid())?;
        match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            _ => return Err(invalid()),
        }
    } else {
        let candidate = trimmed.trim_end_matches('.');
        if candidate.is_empty() || candidate.contains(['/', ':', '@']) {
            return Err(invalid());
        }
        match Host::parse(candidate).map_err(|_| invalid())? {
            Host::Domain(domain) => domain,
            _ => return Err(invalid()),
        }
    };

    let host = host.trim_end_matches('.').to_lowercase();
    if host.is_empty() || host.split('.').any(str::is_empty) {
        return Err(invalid());
    }
    Ok(host)
}

/// 抓取某个域名时请求的URL
pub fn crawl_url(scheme: &str, domain: &str) -> String {
    format!("{}://{}", scheme, domain)
}

/// 抓取内容的存储键：`<domain>_<yyyymmddHHMMSS>.txt`
pub fn content_key(domain: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}.txt", domain, at.format("%Y%m%d%H%M%S"))
}
