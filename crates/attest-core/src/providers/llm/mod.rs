pub mod anthropic;
pub mod gemini;
pub mod huggingface;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod pricing;
pub mod ratelimit;

use async_trait::async_trait;

use crate::errors::ProviderError;
use crate::model::{CompletionRequest, CompletionResponse};

pub use mock::{MockMode, MockProvider};
pub use ratelimit::{RateLimitConfig, RateLimited};

/// Narrow completion capability every LLM backend implements.
///
/// Implementations must be internally thread-safe: one handle is shared
/// across concurrent requests for the lifetime of a session.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn default_model(&self) -> &str;

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError>;
}

/// Default per-request timeout for all remote providers.
pub(crate) const HTTP_TIMEOUT_SECS: u64 = 30;

pub(crate) fn http_client(provider: &'static str) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()
        .map_err(|e| ProviderError::Other(format!("{provider}: failed to build http client: {e}")))
}

/// Effective model for a request: the request's own unless empty.
pub(crate) fn effective_model<'a>(request: &'a CompletionRequest, default: &'a str) -> &'a str {
    if request.model.is_empty() {
        default
    } else {
        &request.model
    }
}
