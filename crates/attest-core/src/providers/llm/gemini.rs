use async_trait::async_trait;
use serde_json::json;
use std::time::Instant;

use super::{effective_model, http_client, pricing, LlmProvider};
use crate::errors::ProviderError;
use crate::model::{CompletionRequest, CompletionResponse, Role};
use crate::providers::credential;

pub struct GeminiProvider {
    api_key: String,
    base_url: String,
    default_model: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: Option<&str>) -> Result<Self, ProviderError> {
        let api_key = credential(api_key, "GOOGLE_API_KEY")
            .ok_or_else(|| ProviderError::Other("gemini: no API key configured".into()))?;
        Ok(Self {
            api_key,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            default_model: "gemini-2.0-flash".to_string(),
            client: http_client("gemini")?,
        })
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let model = effective_model(request, &self.default_model);

        let contents: Vec<_> = request
            .messages
            .iter()
            .map(|msg| {
                // Gemini knows only "user" and "model" roles.
                let role = match msg.role {
                    Role::Assistant => "model",
                    _ => "user",
                };
                json!({"role": role, "parts": [{"text": msg.content}]})
            })
            .collect();

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "temperature": request.temperature,
                "maxOutputTokens": request.max_tokens,
            },
        });
        if let Some(system) = &request.system_prompt {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let started = Instant::now();
        let resp = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest("gemini", &e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_status("gemini", status.as_u16(), text));
        }

        let json: serde_json::Value = resp.json().await.map_err(|e| ProviderError::Malformed {
            provider: "gemini".into(),
            detail: e.to_string(),
        })?;

        let content = json
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::Malformed {
                provider: "gemini".into(),
                detail: "response missing candidates[0].content.parts[0].text".into(),
            })?
            .to_string();

        let input_tokens = json
            .pointer("/usageMetadata/promptTokenCount")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let output_tokens = json
            .pointer("/usageMetadata/candidatesTokenCount")
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
