use async_trait::async_trait;
use serde::Deserialize;

use super::{soft_flag, verdict, EvalContext, EvalOutcome, Evaluator};
use crate::trace::{StepType, Trace};

#[derive(Debug, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
enum TraceCheck {
    ContainsInOrder { tools: Vec<String> },
    RequiredTools { tools: Vec<String> },
    ForbiddenTools { tools: Vec<String> },
    TraceContainsModel { model: String },
}

/// Step-shape checks over the root trace. Sub-traces are deliberately not
/// descended into; whole-tree questions belong to the `trace_tree` kind.
pub struct TraceEvaluator;

fn root_tool_names(trace: &Trace) -> Vec<&str> {
    trace
        .steps
        .iter()
        .filter(|s| s.step_type == StepType::ToolCall)
        .map(|s| s.name.as_str())
        .collect()
}

fn is_subsequence(needle: &[String], haystack: &[&str]) -> bool {
    let mut want = needle.iter();
    let mut next = want.next();
    for &seen in haystack {
        match next {
            Some(expected) if expected == seen => next = want.next(),
            Some(_) => {}
            None => break,
        }
    }
    next.is_none()
}

#[async_trait]
impl Evaluator for TraceEvaluator {
    async fn evaluate(
        &self,
        cx: &EvalContext<'_>,
        spec: &serde_json::Value,
    ) -> anyhow::Result<EvalOutcome> {
        let soft = soft_flag(spec);
        let check: TraceCheck = serde_json::from_value(spec.clone())
            .map_err(|e| anyhow::anyhow!("malformed trace spec: {e}"))?;

        let tools = root_tool_names(cx.trace);
        let (passed, explanation) = match &check {
            TraceCheck::ContainsInOrder { tools: wanted } => {
                let ok = is_subsequence(wanted, &tools);
                (
                    ok,
                    format!(
                        "tool sequence {:?} {} contain {:?} in order",
                        tools,
                        if ok { "does" } else { "does not" },
                        wanted
                    ),
                )
            }
            TraceCheck::RequiredTools { tools: wanted } => {
                let missing: Vec<&String> =
                    wanted.iter().filter(|t| !tools.contains(&t.as_str())).collect();
                (
                    missing.is_empty(),
                    if missing.is_empty() {
                        "all required tools were called".to_string()
                    } else {
                        format!("required tools never called: {missing:?}")
                    },
                )
            }
            TraceCheck::ForbiddenTools { tools: banned } => {
                let hit: Vec<&String> =
                    banned.iter().filter(|t| tools.contains(&t.as_str())).collect();
                (
                    hit.is_empty(),
                    if hit.is_empty() {
                        "no forbidden tools were called".to_string()
                    } else {
                        format!("forbidden tools called: {hit:?}")
                    },
                )
            }
            TraceCheck::TraceContainsModel { model } => {
                let found = cx
                    .trace
                    .steps
                    .iter()
                    .filter(|s| s.step_type == StepType::LlmCall)
                    .any(|s| {
                        s.args.get("model").and_then(|v| v.as_str()) == Some(model.as_str())
                            || s.result.get("model").and_then(|v| v.as_str())
                                == Some(model.as_str())
                    });
                (
                    found,
                    format!(
                        "model '{model}' {} in llm_call steps",
                        if found { "found" } else { "not found" }
                    ),
                )
            }
        };

        Ok(verdict(soft, passed, if passed { 1.0 } else { 0.0 }, explanation))
    }
}
