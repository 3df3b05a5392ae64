use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::errors::ProviderError;
use crate::model::{CompletionRequest, CompletionResponse};
use crate::providers::llm::LlmProvider;

/// Fault injection for simulations. `error_rate = 0` makes the wrapper the
/// identity. The generator is seeded so runs are reproducible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Probability per call of returning a synthetic error.
    #[serde(default)]
    pub error_rate: f64,
    /// Upper bound of uniform latency jitter; negative values clamp to zero.
    #[serde(default)]
    pub latency_jitter_ms: i64,
    /// Per-character probability of substituting response content.
    #[serde(default)]
    pub corruption_rate: f64,
    #[serde(default)]
    pub seed: u64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            error_rate: 0.0,
            latency_jitter_ms: 0,
            corruption_rate: 0.0,
            seed: 0,
        }
    }
}

pub struct FaultInjector {
    inner: Arc<dyn LlmProvider>,
    config: FaultConfig,
    rng: Mutex<StdRng>,
}

impl FaultInjector {
    pub fn new(inner: Arc<dyn LlmProvider>, config: FaultConfig) -> Self {
        let rng = Mutex::new(StdRng::seed_from_u64(config.seed));
        Self { inner, config, rng }
    }
}

const SUBSTITUTES: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

#[async_trait]
impl LlmProvider for FaultInjector {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn default_model(&self) -> &str {
        self.inner.default_model()
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let (inject_error, jitter_ms) = {
            let mut rng = self.rng.lock().unwrap();
            let inject = self.config.error_rate > 0.0 && rng.gen::<f64>() < self.config.error_rate;
            let bound = self.config.latency_jitter_ms.max(0) as u64;
            let jitter = if bound > 0 { rng.gen_range(0..=bound) } else { 0 };
            (inject, jitter)
        };

        if jitter_ms > 0 {
            tokio::time::sleep(Duration::from_millis(jitter_ms)).await;
        }
        if inject_error {
            return Err(ProviderError::Other("injected fault (simulated)".into()));
        }

        let mut response = self.inner.complete(request).await?;
        if self.config.corruption_rate > 0.0 {
            let mut rng = self.rng.lock().unwrap();
            response.content = response
                .content
                .chars()
                .map(|c| {
                    if rng.gen::<f64>() < self.config.corruption_rate {
                        SUBSTITUTES[rng.gen_range(0..SUBSTITUTES.len())] as char
                    } else {
                        c
                    }
                })
                .collect();
        }
        Ok(response)
    }
}
