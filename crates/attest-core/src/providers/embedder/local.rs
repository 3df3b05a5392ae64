//! Local ONNX embeddings, compiled in behind the `local-embeddings` feature.
//!
//! The model produces 384-dim L2-normalized mean-pooled vectors. Without the
//! feature, construction fails and the engine advertises the capability as
//! absent instead.

use async_trait::async_trait;
use std::path::PathBuf;

use super::{EmbedResult, Embedder};
use crate::errors::ProviderError;

pub const LOCAL_EMBEDDING_DIM: usize = 384;
const LOCAL_MODEL_ID: &str = "all-MiniLM-L6-v2";

/// Whether this build carries the local embedding runtime.
pub fn local_embeddings_available() -> bool {
    cfg!(feature = "local-embeddings")
}

#[cfg(feature = "local-embeddings")]
pub struct LocalEmbedder {
    model: std::sync::Arc<std::sync::Mutex<fastembed::TextEmbedding>>,
}

#[cfg(feature = "local-embeddings")]
impl LocalEmbedder {
    /// Load the model, downloading into `cache_dir` (default
    /// `${HOME}/.attest/models`) on first use.
    pub fn new(cache_dir: Option<PathBuf>) -> Result<Self, ProviderError> {
        let cache_dir = cache_dir.unwrap_or_else(super::model_cache_dir);
        let options = fastembed::InitOptions::new(fastembed::EmbeddingModel::AllMiniLML6V2)
            .with_cache_dir(cache_dir);
        let model = fastembed::TextEmbedding::try_new(options)
            .map_err(|e| ProviderError::Other(format!("failed to load local embedding model: {e}")))?;
        Ok(Self {
            model: std::sync::Arc::new(std::sync::Mutex::new(model)),
        })
    }
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbedResult, ProviderError> {
        let model = self.model.clone();
        let text = text.to_string();
        // Inference is CPU-bound; keep it off the async workers.
        let vector = tokio::task::spawn_blocking(move || {
            let mut guard = model.lock().unwrap();
            guard
                .embed(vec![text], None)
                .map(|mut batch| batch.remove(0))
        })
        .await
        .map_err(|e| ProviderError::Other(format!("local embedding task failed: {e}")))?
        .map_err(|e| ProviderError::Other(format!("local embedding inference failed: {e}")))?;

        Ok(EmbedResult {
            vector,
            cost_usd: 0.0,
        })
    }

    fn model_id(&self) -> String {
        LOCAL_MODEL_ID.to_string()
    }
}

#[cfg(not(feature = "local-embeddings"))]
pub struct LocalEmbedder {
    _private: (),
}

#[cfg(not(feature = "local-embeddings"))]
impl LocalEmbedder {
    pub fn new(_cache_dir: Option<PathBuf>) -> Result<Self, ProviderError> {
        Err(ProviderError::Other(
            "local embeddings not available: built without the local-embeddings feature".into(),
        ))
    }
}

#[cfg(not(feature = "local-embeddings"))]
#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed(&self, _text: &str) -> Result<EmbedResult, ProviderError> {
        Err(ProviderError::Other(
            "local embeddings not available: built without the local-embeddings feature".into(),
        ))
    }

    fn model_id(&self) -> String {
        LOCAL_MODEL_ID.to_string()
    }
}

#[cfg(all(test, not(feature = "local-embeddings")))]
mod tests {
    use super::*;

    #[test]
    fn construction_fails_without_the_feature() {
        let err = LocalEmbedder::new(None).err().expect("must not construct");
        assert!(err.to_string().contains("not available"));
    }
}
