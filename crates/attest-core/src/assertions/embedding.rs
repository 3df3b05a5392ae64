use async_trait::async_trait;
use serde::Deserialize;

use super::{path, soft_flag, verdict, EvalContext, EvalOutcome, Evaluator};
use crate::providers::embedder::cosine_similarity;

#[derive(Debug, Deserialize)]
struct EmbeddingSpec {
    text: String,
    threshold: f64,
}

/// Semantic similarity between the expected text and the trace output,
/// using the session's configured embedding provider.
pub struct EmbeddingEvaluator;

#[async_trait]
impl Evaluator for EmbeddingEvaluator {
    async fn evaluate(
        &self,
        cx: &EvalContext<'_>,
        spec: &serde_json::Value,
    ) -> anyhow::Result<EvalOutcome> {
        let soft = soft_flag(spec);
        let parsed: EmbeddingSpec = serde_json::from_value(spec.clone())
            .map_err(|e| anyhow::anyhow!("malformed embedding spec: {e}"))?;
        if !(0.0..=1.0).contains(&parsed.threshold) {
            anyhow::bail!("threshold must be in [0, 1], got {}", parsed.threshold);
        }

        let embedder = cx
            .embedder
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("embedding provider not configured"))?;

        let expected = embedder.embed(&parsed.text).await?;
        let actual = embedder.embed(&path::output_text(cx.trace)).await?;
        let cost = expected.cost_usd + actual.cost_usd;

        let similarity = cosine_similarity(&expected.vector, &actual.vector)?;
        let passed = similarity >= parsed.threshold;
        let mut outcome = verdict(
            soft,
            passed,
            similarity.clamp(0.0, 1.0),
            format!(
                "cosine similarity {similarity:.4} vs threshold {:.4} ({})",
                parsed.threshold,
                embedder.model_id()
            ),
        );
        outcome.cost = cost;
        Ok(outcome)
    }
}
