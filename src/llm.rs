//! LLM completion client.
//!
//! The query engine only needs `complete(system, user)`; anything that speaks
//! the OpenAI chat-completions dialect (OpenAI, Azure-compatible gateways,
//! Ollama, vLLM) works through `OpenAiCompatibleClient`.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::LlmConfig;
use crate::error::{ConfigurationError, ProviderError, ProviderErrorKind};
use crate::retry::{RetryError, RetryPolicy, retry_with_backoff};

#[async_trait]
pub trait LlmClient: Send + Sync {
    fn provider(&self) -> &str;

    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    provider: String,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl OpenAiCompatibleClient {
    pub fn new(config: &LlmConfig) -> Result<Self, ConfigurationError> {
        let base = config.base_url.trim();
        if base.is_empty() {
            return Err(ConfigurationError::MissingField {
                backend: "llm".to_string(),
                field: "base_url".to_string(),
            });
        }
        reqwest::Url::parse(base).map_err(|e| ConfigurationError::InvalidValue {
            field: "llm.base_url".to_string(),
            reason: e.to_string(),
        })?;
        RetryPolicy::check_multiplier(config.retry_backoff).map_err(|reason| {
            ConfigurationError::InvalidValue {
                field: "llm.retry_backoff".to_string(),
                reason,
            }
        })?;
        if config.model.trim().is_empty() {
            return Err(ConfigurationError::MissingField {
                backend: "llm".to_string(),
                field: "model".to_string(),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| ConfigurationError::HttpClient(e.to_string()))?;

        Ok(Self {
            provider: config.provider.clone(),
            endpoint: format!("{}/v1/chat/completions", base.trim_end_matches('/')),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            model: config.model.clone(),
            client,
            retry: config.retry_policy(),
        })
    }

    async fn complete_once(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt }
            ],
            "temperature": 0
        });

        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }

        let resp = req.send().await.map_err(|e| {
            let kind = if e.is_timeout() {
                ProviderErrorKind::Timeout
            } else {
                ProviderErrorKind::Network
            };
            ProviderError::new(&self.provider, kind, format!("LLM request failed: {e}"))
        })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| {
            ProviderError::new(
                &self.provider,
                ProviderErrorKind::Network,
                format!("failed to read LLM response: {e}"),
            )
        })?;

        if !status.is_success() {
            let kind = match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderErrorKind::Auth,
                StatusCode::TOO_MANY_REQUESTS => ProviderErrorKind::RateLimited,
                s => ProviderErrorKind::Status(s.as_u16()),
            };
            let detail: String = text.chars().take(500).collect();
            return Err(ProviderError::new(
                &self.provider,
                kind,
                format!("LLM returned {status}: {detail}"),
            ));
        }

        tracing::debug!("LLM response: {}", text.chars().take(500).collect::<String>());

        let json: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
            ProviderError::new(
                &self.provider,
                ProviderErrorKind::Malformed,
                format!("failed to parse LLM response: {e}"),
            )
        })?;

        json["choices"][0]["message"]["content"]
            .as_str()
            .or_else(|| json["output"].as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                ProviderError::new(
                    &self.provider,
                    ProviderErrorKind::Malformed,
                    "LLM response contained no completion text",
                )
            })
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        let operation = format!("llm {}", self.provider);
        retry_with_backoff(&self.retry, cancel, &operation, |_| {
            self.complete_once(system_prompt, user_prompt)
        })
        .await
        .map_err(|e| match e {
            RetryError::Cancelled { .. } => ProviderError::new(
                &self.provider,
                ProviderErrorKind::Cancelled,
                "LLM call cancelled",
            ),
            RetryError::Failed { source, .. } => source,
        })
    }
}
