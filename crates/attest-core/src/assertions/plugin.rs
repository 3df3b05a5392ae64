use async_trait::async_trait;
use serde::Deserialize;

use super::{EvalContext, EvalOutcome, Evaluator};
use crate::model::AssertionStatus;

#[derive(Debug, Deserialize)]
struct PluginSpec {
    #[serde(default)]
    plugin_name: Option<String>,
}

/// The engine defers the verdict: the evaluator reports `pending` and the
/// pipeline awaits a `submit_plugin_result` submission keyed by
/// `(trace_id, assertion_id)`, bounded by the batch deadline.
pub struct PluginEvaluator;

#[async_trait]
impl Evaluator for PluginEvaluator {
    async fn evaluate(
        &self,
        _cx: &EvalContext<'_>,
        spec: &serde_json::Value,
    ) -> anyhow::Result<EvalOutcome> {
        let parsed: PluginSpec = serde_json::from_value(spec.clone())
            .map_err(|e| anyhow::anyhow!("malformed plugin spec: {e}"))?;
        let explanation = match parsed.plugin_name {
            Some(name) => format!("awaiting result from plugin '{name}'"),
            None => "awaiting plugin result".to_string(),
        };
        Ok(EvalOutcome {
            status: AssertionStatus::Pending,
            score: 0.0,
            explanation,
            cost: 0.0,
        })
    }
}
