use async_trait::async_trait;
use serde_json::json;
use std::time::Instant;

use super::{effective_model, http_client, pricing, LlmProvider};
use crate::errors::ProviderError;
use crate::model::{CompletionRequest, CompletionResponse, Role};
use crate::providers::credential;

pub struct OpenAiProvider {
    api_key: String,
    base_url: String,
    default_model: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(api_key: Option<&str>) -> Result<Self, ProviderError> {
        let api_key = credential(api_key, "OPENAI_API_KEY")
            .ok_or_else(|| ProviderError::Other("openai: no API key configured".into()))?;
        Ok(Self {
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
            default_model: "gpt-4o-mini".to_string(),
            client: http_client("openai")?,
        })
    }

    /// Point at an OpenAI-compatible server (proxies, local gateways).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let model = effective_model(request, &self.default_model);

        let mut messages = Vec::new();
        if let Some(system) = &request.system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
        for msg in &request.messages {
            let role = match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            messages.push(json!({"role": role, "content": msg.content}));
        }

        let body = json!({
            "model": model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        let started = Instant::now();
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest("openai", &e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_status("openai", status.as_u16(), text));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::Malformed {
                provider: "openai".into(),
                detail: e.to_string(),
            })?;

        let content = json
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::Malformed {
                provider: "openai".into(),
                detail: "response missing choices[0].message.content".into(),
            })?
            .to_string();

        let input_tokens = json
            .pointer("/usage/prompt_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let output_tokens = json
            .pointer("/usage/completion_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        Ok(CompletionResponse {
            content,
            model: model.to_string(),
            input_tokens,
            output_tokens,
            cost: pricing::cost_for(model, input_tokens, output_tokens),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}
