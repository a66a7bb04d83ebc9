// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::policy_rule::{PolicyRule, RuleType};
use crate::domain::repositories::policy_rule_repository::PolicyRuleRepository;
use crate::domain::repositories::work_item_repository::RepositoryError;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// 策略错误类型
#[derive(Error, Debug)]
pub enum PolicyError {
    /// 读取规则表失败
    #[error("Failed to load policy rules: {0}")]
    Repository(#[from] RepositoryError),
    /// 读取拦截列表文件失败
    #[error("Failed to read blocklist {path}: {source}")]
    Blocklist {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// 策略快照
///
/// 不可变的放行/拦截后缀集合。重新加载时整体替换，
/// 正在使用旧快照的读者不受影响。
#[derive(Debug, Clone, Default)]
pub struct PolicySnapshot {
    allow: HashSet<String>,
    deny: HashSet<String>,
}

impl PolicySnapshot {
    /// 创建空快照（全部放行）
    pub fn empty() -> Self {
        Self::default()
    }

    /// 由放行和拦截模式构建快照
    ///
    /// 模式会被转为小写并去除 `*.` 通配前缀。
    pub fn new<A, D>(allow: A, deny: D) -> Self
    where
        A: IntoIterator,
        A::Item: AsRef<str>,
        D: IntoIterator,
        D::Item: AsRef<str>,
    {
        Self {
            allow: allow.into_iter().filter_map(|p| normalize_pattern(p.as_ref())).collect(),
            deny: deny.into_iter().filter_map(|p| normalize_pattern(p.as_ref())).collect(),
        }
    }

    /// 由拦截列表条目和规则表构建快照
    ///
    /// # 参数
    ///
    /// * `blocklist` - 拦截列表文件中的域名
    /// * `rules` - 启用的策略规则
    pub fn build(blocklist: Vec<String>, rules: &[PolicyRule]) -> Self {
        let mut deny = blocklist;
        let mut allow = Vec::new();
        for rule in rules.iter().filter(|r| r.is_active) {
            match rule.rule_type {
                RuleType::Allow => allow.push(rule.pattern.clone()),
                RuleType::Deny => deny.push(rule.pattern.clone()),
            }
        }
        Self::new(allow, deny)
    }

    /// 判断域名是否被拦截
    ///
    /// 依次检查域名的每一个点分后缀（不含单独的顶级标签）。
    /// 任一后缀命中放行集合即放行，放行总是优先于拦截；
    /// 否则任一后缀命中拦截集合即拦截。
    ///
    /// # 参数
    ///
    /// * `domain` - 待检查的域名
    ///
    /// # 返回值
    ///
    /// 被拦截返回true
    pub fn is_blocked(&self, domain: &str) -> bool {
        let domain = domain.trim().to_lowercase();
        let candidates = suffixes(&domain);

        if candidates.iter().any(|s| self.allow.contains(*s)) {
            return false;
        }
        candidates.iter().any(|s| self.deny.contains(*s))
    }

    pub fn allow_count(&self) -> usize {
        self.allow.len()
    }

    pub fn deny_count(&self) -> usize {
        self.deny.len()
    }
}

/// 从完整域名到二级域名的全部后缀
fn suffixes(domain: &str) -> Vec<&str> {
    let mut result = Vec::new();
    let mut rest = domain;
    while let Some(pos) = rest.find('.') {
        result.push(rest);
        rest = &rest[pos + 1..];
    }
    result
}

fn normalize_pattern(pattern: &str) -> Option<String> {
    let pattern = pattern.trim().to_lowercase();
    let pattern = pattern.trim_start_matches("*.");
    if pattern.is_empty() {
        None
    } else {
        Some(pattern.to_string())
    }
}

/// 解析拦截列表文本
///
/// 每行一个域名，跳过空行和 `#` 开头的注释。
pub fn parse_blocklist(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_lowercase)
        .collect()
}

/// 域名策略引擎
///
/// 持有当前的策略快照，读者克隆 `Arc` 后无锁使用。
pub struct PolicyEngine {
    rules: Arc<dyn PolicyRuleRepository>,
    blocklist_path: Option<PathBuf>,
    snapshot: RwLock<Arc<PolicySnapshot>>,
    loaded: AtomicBool,
}

impl PolicyEngine {
    /// 创建策略引擎，初始快照为空
    ///
    /// # 参数
    ///
    /// * `rules` - 策略规则仓库
    /// * `blocklist_path` - 静态拦截列表文件路径
    pub fn new(rules: Arc<dyn PolicyRuleRepository>, blocklist_path: Option<PathBuf>) -> Self {
        Self {
            rules,
            blocklist_path,
            snapshot: RwLock::new(Arc::new(PolicySnapshot::empty())),
            loaded: AtomicBool::new(false),
        }
    }

    /// 当前快照
    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        self.snapshot.read().clone()
    }

    /// 是否已经成功加载过
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub fn is_blocked(&self, domain: &str) -> bool {
        self.snapshot().is_blocked(domain)
    }

    /// 重新构建快照并原子替换
    ///
    /// 构建过程中读者继续使用旧快照；构建失败时旧快照保持不变。
    ///
    /// # 返回值
    ///
    /// * `Ok(Arc<PolicySnapshot>)` - 新快照
    /// * `Err(PolicyError)` - 读取规则或拦截列表失败
    pub async fn reload(&self) -> Result<Arc<PolicySnapshot>, PolicyError> {
        let blocklist = self.read_blocklist().await?;
        let blocklist_len = blocklist.len();
        let rules = self.rules.find_active().await?;

        let snapshot = Arc::new(PolicySnapshot::build(blocklist, &rules));
        *self.snapshot.write() = snapshot.clone();
        self.loaded.store(true, Ordering::Release);

        info!(
            blocklist_entries = blocklist_len,
            rules = rules.len(),
            allow = snapshot.allow_count(),
            deny = snapshot.deny_count(),
            "Policy snapshot reloaded"
        );
        Ok(snapshot)
    }

    /// 尚未加载时加载一次
    pub async fn ensure_loaded(&self) -> Result<Arc<PolicySnapshot>, PolicyError> {
        if self.is_loaded() {
            return Ok(self.snapshot());
        }
        self.reload().await
    }

    async fn read_blocklist(&self) -> Result<Vec<String>, PolicyError> {
        let Some(path) = &self.blocklist_path else {
            return Ok(Vec::new());
        };

        match tokio::fs::read_to_string(path).await {
            Ok(text) => Ok(parse_blocklist(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Blocklist file not found, continuing without it");
                Ok(Vec::new())
            }
            Err(source) => Err(PolicyError::Blocklist {
                path: path.display().to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
#[path = "policy_engine_test.rs"]
mod tests;
