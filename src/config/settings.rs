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

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// 应用程序配置设置
///
/// 包含数据库、流水线、恢复监控、策略、协作方和指标等所有配置项。
/// 启动时加载一次，不支持热更新。
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// 数据库配置
    pub database: DatabaseSettings,
    /// 流水线周期配置
    pub pipeline: PipelineSettings,
    /// 恢复监控配置
    pub recovery: RecoverySettings,
    /// 域名策略配置
    pub policy: PolicySettings,
    /// 抓取器配置
    pub crawler: CrawlerSettings,
    /// 分类器配置
    pub analyzer: AnalyzerSettings,
    /// 知识库配置
    pub knowledge: KnowledgeSettings,
    /// 内容存储配置
    pub storage: StorageSettings,
    /// 指标导出配置
    pub metrics: MetricsSettings,
}

/// 数据库配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// 数据库连接URL
    pub url: String,
    /// 最大连接数
    pub max_connections: Option<u32>,
    /// 最小连接数
    pub min_connections: Option<u32>,
    /// 连接超时时间（秒）
    pub connect_timeout: Option<u64>,
    /// 空闲连接超时时间（秒）
    pub idle_timeout: Option<u64>,
    /// 是否输出SQL日志
    #[serde(default)]
    pub sqlx_logging: bool,
}

/// 流水线周期配置
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSettings {
    /// 每次抓取周期最多认领的工作项数
    pub crawl_batch_size: u64,
    /// 每次分析周期最多认领的工作项数
    pub analysis_batch_size: u64,
    /// 抓取周期触发间隔（秒）
    pub crawl_interval_secs: u64,
    /// 分析周期触发间隔（秒）
    pub analysis_interval_secs: u64,
    /// 同一周期允许重叠运行的最大数量
    pub max_concurrent_runs: usize,
    /// 单个工作项分析的硬超时（秒）
    pub analysis_timeout_secs: u64,
    /// 抓取内容的最小长度（字符），低于该长度视为失败
    pub min_content_length: usize,
}

impl PipelineSettings {
    pub fn crawl_interval(&self) -> Duration {
        Duration::from_secs(self.crawl_interval_secs)
    }

    pub fn analysis_interval(&self) -> Duration {
        Duration::from_secs(self.analysis_interval_secs)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_secs)
    }
}

impl KnowledgeSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// 恢复监控配置
#[derive(Debug, Clone, Deserialize)]
pub struct RecoverySettings {
    /// 启动时是否回退所有活跃工作项
    pub recover_on_startup: bool,
    /// 周期性扫描间隔（秒）
    pub sweep_interval_secs: u64,
    /// 活跃状态停留超过该时间即视为卡住（秒）
    pub staleness_threshold_secs: u64,
    /// 周期超过该时间未运行即视为停滞（秒）
    pub stall_threshold_secs: u64,
    /// 抓取周期超过该时间未运行时健康状态降级（秒）
    pub crawl_degraded_secs: u64,
    /// 分析周期超过该时间未运行时健康状态降级（秒）
    pub analysis_degraded_secs: u64,
}

impl RecoverySettings {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn staleness_threshold(&self) -> Duration {
        Duration::from_secs(self.staleness_threshold_secs)
    }

    pub fn stall_threshold(&self) -> Duration {
        Duration::from_secs(self.stall_threshold_secs)
    }
}

/// 域名策略配置
#[derive(Debug, Clone, Deserialize)]
pub struct PolicySettings {
    /// 静态拦截列表文件路径
    pub blocklist_path: Option<String>,
}

/// 抓取器配置
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerSettings {
    /// 请求使用的URL协议
    pub scheme: String,
    /// User-Agent
    pub user_agent: String,
    /// 请求超时（秒）
    pub timeout_secs: u64,
}

/// 分类器配置
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzerSettings {
    /// 分类服务地址（Ollama 风格的 /api/generate）
    pub base_url: String,
    /// 模型名称
    pub model: String,
    /// 送入模型的最大内容长度（字符）
    pub max_content_chars: usize,
}

/// 知识库配置
#[derive(Debug, Clone, Deserialize)]
pub struct KnowledgeSettings {
    /// 是否启用知识库索引
    pub enabled: bool,
    /// 知识库服务地址
    pub base_url: Option<String>,
    /// 集合名称
    pub collection: String,
    /// 请求超时（秒）
    pub timeout_secs: u64,
}

/// 存储配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// 存储类型 (local, memory)
    pub storage_type: String,
    /// 本地存储路径 (当 type=local 时使用)
    pub local_path: String,
}

/// 指标导出配置
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSettings {
    /// 是否启用 Prometheus 导出器
    pub enabled: bool,
    /// 导出器监听地址
    pub listen_addr: String,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 加载顺序：内置默认值 → config/default.toml → config/{APP_ENVIRONMENT}.toml
    /// → 环境变量（前缀 DOMAIN_INTEL，分隔符 `__`）
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("DOMAIN_INTEL")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }

    /// 内置默认值
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            // Database
            .set_default("database.url", "sqlite://domain_intel.db?mode=rwc")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 1)?
            .set_default("database.connect_timeout", 10)?
            .set_default("database.idle_timeout", 300)?
            .set_default("database.sqlx_logging", false)?
            // Pipeline
            .set_default("pipeline.crawl_batch_size", 30)?
            .set_default("pipeline.analysis_batch_size", 20)?
            .set_default("pipeline.crawl_interval_secs", 10)?
            .set_default("pipeline.analysis_interval_secs", 5)?
            .set_default("pipeline.max_concurrent_runs", 2)?
            .set_default("pipeline.analysis_timeout_secs", 120)?
            .set_default("pipeline.min_content_length", 50)?
            // Recovery
            .set_default("recovery.recover_on_startup", true)?
            .set_default("recovery.sweep_interval_secs", 60)?
            .set_default("recovery.staleness_threshold_secs", 600)?
            .set_default("recovery.stall_threshold_secs", 300)?
            .set_default("recovery.crawl_degraded_secs", 60)?
            .set_default("recovery.analysis_degraded_secs", 30)?
            // Policy
            .set_default("policy.blocklist_path", "data/blocklist.txt")?
            // Crawler
            .set_default("crawler.scheme", "https")?
            .set_default("crawler.user_agent", "domain-intel/0.1")?
            .set_default("crawler.timeout_secs", 30)?
            // Analyzer
            .set_default("analyzer.base_url", "http://localhost:11434")?
            .set_default("analyzer.model", "llama3")?
            .set_default("analyzer.max_content_chars", 4000)?
            // Knowledge
            .set_default("knowledge.enabled", false)?
            .set_default("knowledge.collection", "domain_intel")?
            .set_default("knowledge.timeout_secs", 30)?
            // Storage
            .set_default("storage.storage_type", "local")?
            .set_default("storage.local_path", "./storage/content")?
            // Metrics
            .set_default("metrics.enabled", false)?
            .set_default("metrics.listen_addr", "0.0.0.0:9000")
    }
}

#[cfg(test)]
#[path = "settings_test.rs"]
mod tests;
