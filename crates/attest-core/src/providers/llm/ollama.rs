use async_trait::async_trait;
use serde_json::json;
use std::time::Instant;

use super::{effective_model, http_client, LlmProvider};
use crate::errors::ProviderError;
use crate::model::{CompletionRequest, CompletionResponse, Role};

/// Locally-served models; no API key, zero cost.
pub struct OllamaProvider {
    base_url: String,
    default_model: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(base_url: Option<&str>) -> Result<Self, ProviderError> {
        let base_url = base_url
            .map(str::to_string)
            .or_else(|| std::env::var("OLLAMA_BASE_URL").ok())
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        Ok(Self {
            base_url,
            default_model: "llama3.2".to_string(),
            client: http_client("ollama")?,
        })
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
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
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            },
        });

        let started = Instant::now();
        let resp = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest("ollama", &e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_status("ollama", status.as_u16(), text));
        }

        let json: serde_json::Value = resp.json().await.map_err(|e| ProviderError::Malformed {
            provider: "ollama".into(),
            detail: e.to_string(),
        })?;

        let content = json
            .pointer("/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::Malformed {
                provider: "ollama".into(),
                detail: "response missing message.content".into(),
            })?
            .to_string();

        Ok(CompletionResponse {
            content,
            model: model.to_string(),
            input_tokens: json
                .pointer("/prompt_eval_count")
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            output_tokens: json.pointer("/eval_count").and_then(|v| v.as_u64()).unwrap_or(0),
            cost: 0.0,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}
