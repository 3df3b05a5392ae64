use async_trait::async_trait;
use serde_json::json;

use super::{EmbedResult, Embedder};
use crate::errors::ProviderError;
use crate::providers::credential;
use crate::providers::llm::pricing;

const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// Remote embeddings over the OpenAI-compatible `/embeddings` surface.
pub struct OpenAiEmbedder {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiEmbedder {
    pub fn new(api_key: Option<&str>, model: Option<&str>) -> Result<Self, ProviderError> {
        let api_key = credential(api_key, "OPENAI_API_KEY")
            .ok_or_else(|| ProviderError::Other("openai embeddings: no API key configured".into()))?;
        Ok(Self {
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .map_err(|e| ProviderError::Other(format!("openai embeddings: {e}")))?,
        })
    }

    /// Point at an OpenAI-compatible server (proxies, local gateways).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbedResult, ProviderError> {
        let body = json!({
            "input": text,
            "model": self.model,
            "encoding_format": "float",
        });

        let resp = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest("openai-embeddings", &e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(
                "openai-embeddings",
                status.as_u16(),
                text,
            ));
        }

        let json: serde_json::Value = resp.json().await.map_err(|e| ProviderError::Malformed {
            provider: "openai-embeddings".into(),
            detail: e.to_string(),
        })?;

        let vector: Vec<f32> = json
            .pointer("/data/0/embedding")
            .and_then(|v| v.as_array())
            .filter(|arr| !arr.is_empty())
            .ok_or_else(|| ProviderError::Malformed {
                provider: "openai-embeddings".into(),
                detail: "response missing data[0].embedding".into(),
            })?
            .iter()
            .map(|x| x.as_f64().unwrap_or(0.0) as f32)
            .collect();

        let tokens = json
            .pointer("/usage/prompt_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        Ok(EmbedResult {
            vector,
            cost_usd: pricing::cost_for(&self.model, tokens, 0),
        })
    }

    fn model_id(&self) -> String {
        self.model.clone()
    }
}
