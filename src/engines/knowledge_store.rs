// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::KnowledgeSettings;
use crate::engines::traits::{KnowledgeError, KnowledgeStore};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// HTTP知识库
///
/// 以域名为文档ID写入 `{base_url}/collections/{collection}/documents`，
/// 同一域名重复写入时覆盖。
pub struct HttpKnowledgeStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
}

impl HttpKnowledgeStore {
    pub fn new(
        base_url: &str,
        collection: &str,
        timeout: Duration,
    ) -> Result<Self, KnowledgeError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
        })
    }
}

#[async_trait]
impl KnowledgeStore for HttpKnowledgeStore {
    async fn index(
        &self,
        domain: &str,
        text: &str,
        category: &str,
        malicious: bool,
    ) -> Result<(), KnowledgeError> {
        let url = format!(
            "{}/collections/{}/documents",
            self.base_url, self.collection
        );
        let response = self
            .client
            .post(url)
            .json(&json!({
                "id": domain,
                "text": text,
                "metadata": {
                    "domain": domain,
                    "category": category,
                    "is_malicious": malicious,
                }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(KnowledgeError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

/// 不做任何事的知识库，知识库未启用时使用
pub struct NoopKnowledgeStore;

#[async_trait]
impl KnowledgeStore for NoopKnowledgeStore {
    async fn index(
        &self,
        _domain: &str,
        _text: &str,
        _category: &str,
        _malicious: bool,
    ) -> Result<(), KnowledgeError> {
        Ok(())
    }
}

/// 根据配置创建知识库
pub fn create_knowledge_store(
    settings: &KnowledgeSettings,
) -> Result<Arc<dyn KnowledgeStore>, KnowledgeError> {
    match (settings.enabled, settings.base_url.as_deref()) {
        (true, Some(base_url)) => {
            info!(base_url, collection = %settings.collection, "Knowledge store enabled");
            Ok(Arc::new(HttpKnowledgeStore::new(
                base_url,
                &settings.collection,
                settings.timeout(),
            )?))
        }
        _ => {
            info!("Knowledge store disabled");
            Ok(Arc::new(NoopKnowledgeStore))
        }
    }
}
