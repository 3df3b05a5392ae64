use async_trait::async_trait;
use serde_json::json;
use std::time::Instant;

use super::{effective_model, http_client, pricing, LlmProvider};
use crate::errors::ProviderError;
use crate::model::{CompletionRequest, CompletionResponse, Role};
use crate::providers::credential;

pub struct AnthropicProvider {
    api_key: String,
    base_url: String,
    default_model: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: Option<&str>) -> Result<Self, ProviderError> {
        let api_key = credential(api_key, "ANTHROPIC_API_KEY")
            .ok_or_else(|| ProviderError::Other("anthropic: no API key configured".into()))?;
        Ok(Self {
            api_key,
            base_url: "https://api.anthropic.com/v1".to_string(),
            default_model: "claude-3-5-haiku-20241022".to_string(),
            client: http_client("anthropic")?,
        })
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let model = effective_model(request, &self.default_model);

        // Anthropic takes the system prompt as a top-level field; system-role
        // messages inside the history are folded into it.
        let mut system = request.system_prompt.clone().unwrap_or_default();
        let mut messages = Vec::new();
        for msg in &request.messages {
            match msg.role {
                Role::System => {
                    if !system.is_empty() {
                        system.push('\n');
                    }
                    system.push_str(&msg.content);
                }
                Role::User => messages.push(json!({"role": "user", "content": msg.content})),
                Role::Assistant => {
                    messages.push(json!({"role": "assistant", "content": msg.content}));
                }
            }
        }

        let mut body = json!({
            "model": model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if !system.is_empty() {
            body["system"] = json!(system);
        }

        let started = Instant::now();
        let resp = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest("anthropic", &e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_status("anthropic", status.as_u16(), text));
        }

        let json: serde_json::Value = resp.json().await.map_err(|e| ProviderError::Malformed {
            provider: "anthropic".into(),
            detail: e.to_string(),
        })?;

        let content = json
            .pointer("/content/0/text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::Malformed {
                provider: "anthropic".into(),
                detail: "response missing content[0].text".into(),
            })?
            .to_string();

        let input_tokens = json
            .pointer("/usage/input_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let output_tokens = json
            .pointer("/usage/output_tokens")
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
