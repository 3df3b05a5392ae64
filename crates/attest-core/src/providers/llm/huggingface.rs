use async_trait::async_trait;
use serde_json::json;
use std::time::Instant;

use super::{effective_model, http_client, LlmProvider};
use crate::errors::ProviderError;
use crate::model::{CompletionRequest, CompletionResponse, Role};
use crate::providers::credential;

/// Hugging Face inference router; speaks the OpenAI-compatible chat surface.
pub struct HuggingFaceProvider {
    api_key: String,
    base_url: String,
    default_model: String,
    client: reqwest::Client,
}

impl HuggingFaceProvider {
    pub fn new(api_key: Option<&str>) -> Result<Self, ProviderError> {
        let api_key = credential(api_key, "HF_API_KEY")
            .ok_or_else(|| ProviderError::Other("huggingface: no API key configured".into()))?;
        Ok(Self {
            api_key,
            base_url: "https://router.huggingface.co/v1".to_string(),
            default_model: "meta-llama/Llama-3.1-8B-Instruct".to_string(),
            client: http_client("huggingface")?,
        })
    }
}

#[async_trait]
impl LlmProvider for HuggingFaceProvider {
    fn name(&self) -> &'static str {
        "huggingface"
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
            .map_err(|e| ProviderError::from_reqwest("huggingface", &e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(
                "huggingface",
                status.as_u16(),
                text,
            ));
        }

        let json: serde_json::Value = resp.json().await.map_err(|e| ProviderError::Malformed {
            provider: "huggingface".into(),
            detail: e.to_string(),
        })?;

        let content = json
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::Malformed {
                provider: "huggingface".into(),
                detail: "response missing choices[0].message.content".into(),
            })?
            .to_string();

        Ok(CompletionResponse {
            content,
            model: model.to_string(),
            input_tokens: json
                .pointer("/usage/prompt_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            output_tokens: json
                .pointer("/usage/completion_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            cost: 0.0,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}
