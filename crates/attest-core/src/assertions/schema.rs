use async_trait::async_trait;
use serde::Deserialize;

use super::{path, soft_flag, verdict, EvalContext, EvalOutcome, Evaluator};

#[derive(Debug, Deserialize)]
struct SchemaSpec {
    /// Dotted-path selector resolved against the serialized trace; empty
    /// selects the whole trace.
    #[serde(default)]
    target: String,
    schema: serde_json::Value,
}

/// Validates the selected trace fragment against a JSON Schema.
pub struct SchemaEvaluator;

#[async_trait]
impl Evaluator for SchemaEvaluator {
    async fn evaluate(
        &self,
        cx: &EvalContext<'_>,
        spec: &serde_json::Value,
    ) -> anyhow::Result<EvalOutcome> {
        let soft = soft_flag(spec);
        let parsed: SchemaSpec = serde_json::from_value(spec.clone())
            .map_err(|e| anyhow::anyhow!("malformed schema spec: {e}"))?;

        let trace_value = serde_json::to_value(cx.trace)?;
        let selected = path::resolve(&trace_value, &parsed.target)
            .ok_or_else(|| anyhow::anyhow!("target '{}' not found in trace", parsed.target))?;

        let validator = jsonschema::validator_for(&parsed.schema)
            .map_err(|e| anyhow::anyhow!("invalid JSON Schema: {e}"))?;

        let violations: Vec<String> = validator
            .iter_errors(selected)
            .map(|err| format!("{} at {}", err, err.instance_path()))
            .collect();

        let passed = violations.is_empty();
        let explanation = if passed {
            format!("'{}' conforms to schema", parsed.target)
        } else {
            violations.join("; ")
        };
        Ok(verdict(soft, passed, if passed { 1.0 } else { 0.0 }, explanation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AssertionStatus;
    use crate::trace::Trace;
    use serde_json::json;

    fn cx(trace: &Trace) -> EvalContext<'_> {
        EvalContext {
            trace,
            llm: None,
            embedder: None,
        }
    }

    #[tokio::test]
    async fn valid_output_passes() {
        let mut trace = Trace::new("t", "a");
        trace.output = json!({"message": "done", "code": 200});
        let spec = json!({
            "target": "output",
            "schema": {
                "type": "object",
                "required": ["message"],
                "properties": {"message": {"type": "string"}}
            }
        });
        let outcome = SchemaEvaluator.evaluate(&cx(&trace), &spec).await.unwrap();
        assert_eq!(outcome.status, AssertionStatus::Pass);
        assert_eq!(outcome.score, 1.0);
    }

    #[tokio::test]
    async fn violation_fails_with_details() {
        let mut trace = Trace::new("t", "a");
        trace.output = json!({"code": "not-a-number"});
        let spec = json!({
            "target": "output",
            "schema": {"type": "object", "properties": {"code": {"type": "integer"}}}
        });
        let outcome = SchemaEvaluator.evaluate(&cx(&trace), &spec).await.unwrap();
        assert_eq!(outcome.status, AssertionStatus::HardFail);
        assert!(outcome.explanation.contains("integer"));
    }

    #[tokio::test]
    async fn soft_violation_is_a_soft_fail() {
        let mut trace = Trace::new("t", "a");
        trace.output = json!({});
        let spec = json!({
            "target": "output",
            "schema": {"type": "object", "required": ["message"]},
            "soft": true
        });
        let outcome = SchemaEvaluator.evaluate(&cx(&trace), &spec).await.unwrap();
        assert_eq!(outcome.status, AssertionStatus::SoftFail);
    }

    #[tokio::test]
    async fn missing_target_is_an_error() {
        let trace = Trace::new("t", "a");
        let spec = json!({"target": "no.such.path", "schema": {"type": "object"}});
        assert!(SchemaEvaluator.evaluate(&cx(&trace), &spec).await.is_err());
    }
}
