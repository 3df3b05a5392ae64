pub mod local;
pub mod openai;

use async_trait::async_trait;

use crate::errors::ProviderError;

pub use local::LocalEmbedder;
pub use openai::OpenAiEmbedder;

/// An embedding vector together with the USD cost of producing it.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbedResult {
    pub vector: Vec<f32>,
    pub cost_usd: f64,
}

/// Uniform `text -> vector` capability.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<EmbedResult, ProviderError>;

    fn model_id(&self) -> String;
}

/// Cosine similarity with f64 accumulation.
///
/// Fails when the lengths differ or either vector has zero magnitude; the
/// quotient is returned as-is, without clamping or prior normalization.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> anyhow::Result<f64> {
    if a.len() != b.len() {
        anyhow::bail!("embedding dims mismatch: expected {}, got {}", a.len(), b.len());
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        dot += f64::from(x) * f64::from(y);
        norm_a += f64::from(x) * f64::from(x);
        norm_b += f64::from(y) * f64::from(y);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        anyhow::bail!("cosine similarity undefined for zero-magnitude vector");
    }
    Ok(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Default model cache directory (`${HOME}/.attest/models`).
pub fn model_cache_dir() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".attest")
        .join("models")
}
