use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;

use super::{path, soft_flag, verdict, EvalContext, EvalOutcome, Evaluator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Ne,
    Between,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Between => "between",
        };
        f.write_str(s)
    }
}

/// Shared numeric comparison; `between` is the closed interval `[min, max]`.
pub(crate) fn compare(
    op: Operator,
    actual: f64,
    value: Option<f64>,
    min: Option<f64>,
    max: Option<f64>,
) -> anyhow::Result<bool> {
    match op {
        Operator::Between => {
            let (min, max) = match (min, max) {
                (Some(min), Some(max)) => (min, max),
                _ => anyhow::bail!("between requires both min and max"),
            };
            Ok(actual >= min && actual <= max)
        }
        _ => {
            let value = value.ok_or_else(|| anyhow::anyhow!("operator {op} requires a value"))?;
            Ok(match op {
                Operator::Lt => actual < value,
                Operator::Lte => actual <= value,
                Operator::Gt => actual > value,
                Operator::Gte => actual >= value,
                Operator::Eq => actual == value,
                Operator::Ne => actual != value,
                Operator::Between => unreachable!(),
            })
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConstraintSpec {
    field: String,
    operator: Operator,
    #[serde(default)]
    value: Option<f64>,
    #[serde(default)]
    min: Option<f64>,
    #[serde(default)]
    max: Option<f64>,
}

/// Numeric comparison against a metadata field (`metadata.cost_usd`,
/// `metadata.total_tokens`, `metadata.latency_ms`).
pub struct ConstraintEvaluator;

#[async_trait]
impl Evaluator for ConstraintEvaluator {
    async fn evaluate(
        &self,
        cx: &EvalContext<'_>,
        spec: &serde_json::Value,
    ) -> anyhow::Result<EvalOutcome> {
        let soft = soft_flag(spec);
        let parsed: ConstraintSpec = serde_json::from_value(spec.clone())
            .map_err(|e| anyhow::anyhow!("malformed constraint spec: {e}"))?;

        let trace_value = serde_json::to_value(cx.trace)?;
        let actual = path::resolve(&trace_value, &parsed.field)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| {
                anyhow::anyhow!("field '{}' missing or not numeric", parsed.field)
            })?;

        let passed = compare(parsed.operator, actual, parsed.value, parsed.min, parsed.max)?;
        let expectation = match parsed.operator {
            Operator::Between => format!(
                "between [{}, {}]",
                parsed.min.unwrap_or_default(),
                parsed.max.unwrap_or_default()
            ),
            op => format!("{op} {}", parsed.value.unwrap_or_default()),
        };
        let explanation = format!(
            "{} = {} {} {}",
            parsed.field,
            actual,
            if passed { "satisfies" } else { "violates" },
            expectation
        );
        Ok(verdict(soft, passed, if passed { 1.0 } else { 0.0 }, explanation))
    }
}
