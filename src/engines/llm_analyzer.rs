// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::AnalyzerSettings;
use crate::domain::models::classification::{CategoryHints, Classification};
use crate::engines::traits::{Analyzer, AnalyzerError};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

/// LLM分类器
///
/// 调用 Ollama 风格的 `/api/generate` 接口，要求模型以 JSON 输出
/// `category_main`、`is_malicious`、`confidence_score` 和 `summary`。
/// 不设置请求超时，截止时间由分析周期控制。
pub struct HttpAnalyzer {
    client: reqwest::Client,
    base_url: String,
    model: String,
    max_content_chars: usize,
}

impl HttpAnalyzer {
    pub fn new(settings: &AnalyzerSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            max_content_chars: settings.max_content_chars,
        }
    }

    fn build_prompt(&self, domain: &str, content: &str, hints: &CategoryHints) -> String {
        let excerpt: String = content.chars().take(self.max_content_chars).collect();

        let mut prompt = format!("Analyze the website {}.\n", domain);
        if !hints.is_empty() {
            prompt.push_str("Choose category_main from these categories:\n");
            for (name, description) in hints {
                prompt.push_str(&format!("- {}: {}\n", name, description));
            }
        }
        prompt.push_str(&format!("Content:\n{}\n", excerpt));
        prompt.push_str(
            "JSON Output keys: category_main, is_malicious, confidence_score, summary.",
        );
        prompt
    }
}

/// 解析模型输出
///
/// 去掉可能的 markdown 代码块标记；输出为空时返回None。
fn parse_model_output(text: &str, model: &str) -> Result<Option<Classification>, AnalyzerError> {
    let clean = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    if clean.is_empty() || clean == "{}" {
        return Ok(None);
    }

    let mut value: Value =
        serde_json::from_str(clean).map_err(|e| AnalyzerError::Parse(e.to_string()))?;
    if let Some(obj) = value.as_object_mut() {
        if !obj.contains_key("model") && !obj.contains_key("llm_model_used") {
            obj.insert("model".to_string(), Value::String(model.to_string()));
        }
    }

    let classification: Classification =
        serde_json::from_value(value).map_err(|e| AnalyzerError::Parse(e.to_string()))?;
    Ok(Some(classification))
}

#[async_trait]
impl Analyzer for HttpAnalyzer {
    async fn classify(
        &self,
        domain: &str,
        content: &str,
        category_hints: &CategoryHints,
    ) -> Result<Option<Classification>, AnalyzerError> {
        let request_body = json!({
            "model": self.model,
            "prompt": self.build_prompt(domain, content, category_hints),
            "stream": false,
            "format": "json",
        });

        let url = format!("{}/api/generate", self.base_url);
        let response = self.client.post(url).json(&request_body).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AnalyzerError::Status { status, body });
        }

        let body: Value = response.json().await?;
        let Some(text) = body.get("response").and_then(Value::as_str) else {
            return Ok(None);
        };
        debug!(domain, chars = text.len(), "Analyzer responded");

        parse_model_output(text, &self.model)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn analyzer(base_url: String) -> HttpAnalyzer {
        HttpAnalyzer::new(&AnalyzerSettings {
            base_url,
            model: "llama3".to_string(),
            max_content_chars: 100,
        })
    }

    #[tokio::test]
    async fn test_classify_parses_generate_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({"model": "llama3", "format": "json"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": "{\"category_main\": \"Malicious\", \"is_malicious\": true, \"confidence_score\": 0.92, \"summary\": \"Phishing kit\"}"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = analyzer(server.uri())
            .classify("phish.example.org", "login page", &CategoryHints::new())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.category, "Malicious");
        assert!(result.malicious);
        assert_eq!(result.confidence, 0.92);
        assert_eq!(result.model, "llama3");
    }

    #[tokio::test]
    async fn test_classify_empty_response_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "{}"})))
            .mount(&server)
            .await;

        let result = analyzer(server.uri())
            .classify("example.com", "content", &CategoryHints::new())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_classify_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("model loading"))
            .mount(&server)
            .await;

        let err = analyzer(server.uri())
            .classify("example.com", "content", &CategoryHints::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyzerError::Status { status: 503, .. }));
    }

    #[test]
    fn test_prompt_lists_hints_and_truncates() {
        let analyzer = analyzer("http://localhost".to_string());
        let mut hints = CategoryHints::new();
        hints.insert("Gambling".to_string(), "Online betting".to_string());

        let content = "x".repeat(500);
        let prompt = analyzer.build_prompt("example.com", &content, &hints);

        assert!(prompt.contains("- Gambling: Online betting"));
        assert!(!prompt.contains(&"x".repeat(101)));
    }

    #[test]
    fn test_parse_strips_code_fences() {
        let text = "```json\n{\"category\": \"News\", \"malicious\": false}\n```";
        let parsed = parse_model_output(text, "m").unwrap().unwrap();
        assert_eq!(parsed.category, "News");
        assert_eq!(parsed.model, "m");
        assert!(parse_model_output("not json", "m").is_err());
    }
}
