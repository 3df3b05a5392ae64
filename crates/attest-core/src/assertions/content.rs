use async_trait::async_trait;
use serde::Deserialize;

use super::{path, soft_flag, verdict, EvalContext, EvalOutcome, Evaluator};

#[derive(Debug, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
enum ContentCheck {
    Contains { value: String },
    NotContains { value: String },
    Forbidden { values: Vec<String> },
    Matches { pattern: String },
}

#[derive(Debug, Deserialize)]
struct ContentFlags {
    #[serde(default)]
    case_insensitive: bool,
}

/// Textual checks over the trace output projection. Matching is
/// case-sensitive unless `case_insensitive` is set.
pub struct ContentEvaluator;

#[async_trait]
impl Evaluator for ContentEvaluator {
    async fn evaluate(
        &self,
        cx: &EvalContext<'_>,
        spec: &serde_json::Value,
    ) -> anyhow::Result<EvalOutcome> {
        let soft = soft_flag(spec);
        let check: ContentCheck = serde_json::from_value(spec.clone())
            .map_err(|e| anyhow::anyhow!("malformed content spec: {e}"))?;
        let flags: ContentFlags = serde_json::from_value(spec.clone())?;

        let output = path::output_text(cx.trace);
        let haystack = if flags.case_insensitive {
            output.to_lowercase()
        } else {
            output.clone()
        };
        let fold = |needle: &str| {
            if flags.case_insensitive {
                needle.to_lowercase()
            } else {
                needle.to_string()
            }
        };

        let (passed, explanation) = match &check {
            ContentCheck::Contains { value } => {
                let found = haystack.contains(&fold(value));
                (
                    found,
                    if found {
                        format!("output contains '{value}'")
                    } else {
                        format!("output does not contain '{value}'")
                    },
                )
            }
            ContentCheck::NotContains { value } => {
                let found = haystack.contains(&fold(value));
                (
                    !found,
                    if found {
                        format!("output unexpectedly contains '{value}'")
                    } else {
                        format!("output is free of '{value}'")
                    },
                )
            }
            ContentCheck::Forbidden { values } => {
                let offenders: Vec<&String> = values
                    .iter()
                    .filter(|v| haystack.contains(&fold(v)))
                    .collect();
                (
                    offenders.is_empty(),
                    if offenders.is_empty() {
                        "no forbidden phrases found".to_string()
                    } else {
                        format!(
                            "forbidden phrases present: {}",
                            offenders
                                .iter()
                                .map(|s| format!("'{s}'"))
                                .collect::<Vec<_>>()
                                .join(", ")
                        )
                    },
                )
            }
            ContentCheck::Matches { pattern } => {
                let pattern = if flags.case_insensitive {
                    format!("(?i){pattern}")
                } else {
                    pattern.clone()
                };
                let re = regex::Regex::new(&pattern)
                    .map_err(|e| anyhow::anyhow!("invalid pattern: {e}"))?;
                let matched = re.is_match(&output);
                (
                    matched,
                    if matched {
                        format!("output matches /{pattern}/")
                    } else {
                        format!("output does not match /{pattern}/")
                    },
                )
            }
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

    fn trace_saying(message: &str) -> Trace {
        let mut trace = Trace::new("t", "a");
        trace.output = json!({ "message": message });
        trace
    }

    fn cx(trace: &Trace) -> EvalContext<'_> {
        EvalContext {
            trace,
            llm: None,
            embedder: None,
        }
    }

    #[tokio::test]
    async fn contains_is_case_sensitive_by_default() {
        let trace = trace_saying("Refund RFD-999 approved");
        let spec = json!({"check": "contains", "value": "refund"});
        let outcome = ContentEvaluator.evaluate(&cx(&trace), &spec).await.unwrap();
        assert_eq!(outcome.status, AssertionStatus::HardFail);

        let spec = json!({"check": "contains", "value": "refund", "case_insensitive": true});
        let outcome = ContentEvaluator.evaluate(&cx(&trace), &spec).await.unwrap();
        assert_eq!(outcome.status, AssertionStatus::Pass);
    }

    #[tokio::test]
    async fn contains_passes_on_exact_case() {
        let trace = trace_saying("Refund RFD-999 approved");
        let spec = json!({"check": "contains", "value": "Refund"});
        let outcome = ContentEvaluator.evaluate(&cx(&trace), &spec).await.unwrap();
        assert_eq!(outcome.status, AssertionStatus::Pass);
    }

    #[tokio::test]
    async fn not_contains_fails_when_present() {
        let trace = trace_saying("internal error leaked");
        let spec = json!({"check": "not_contains", "value": "internal error"});
        let outcome = ContentEvaluator.evaluate(&cx(&trace), &spec).await.unwrap();
        assert_eq!(outcome.status, AssertionStatus::HardFail);
    }

    #[tokio::test]
    async fn forbidden_reports_each_offender() {
        let trace = trace_saying("password: hunter2, token: abc");
        let spec = json!({"check": "forbidden", "values": ["password", "ssn", "token"]});
        let outcome = ContentEvaluator.evaluate(&cx(&trace), &spec).await.unwrap();
        assert_eq!(outcome.status, AssertionStatus::HardFail);
        assert!(outcome.explanation.contains("'password'"));
        assert!(outcome.explanation.contains("'token'"));
        assert!(!outcome.explanation.contains("'ssn'"));
    }

    #[tokio::test]
    async fn matches_uses_regex_semantics() {
        let trace = trace_saying("ticket ABC-1234 closed");
        let spec = json!({"check": "matches", "pattern": "[A-Z]{3}-\\d+"});
        let outcome = ContentEvaluator.evaluate(&cx(&trace), &spec).await.unwrap();
        assert_eq!(outcome.status, AssertionStatus::Pass);
    }

    #[tokio::test]
    async fn invalid_regex_is_an_error() {
        let trace = trace_saying("anything");
        let spec = json!({"check": "matches", "pattern": "(unclosed"});
        assert!(ContentEvaluator.evaluate(&cx(&trace), &spec).await.is_err());
    }

    #[tokio::test]
    async fn object_output_without_message_is_serialized() {
        let mut trace = Trace::new("t", "a");
        trace.output = json!({"refund_id": "RFD-999"});
        let spec = json!({"check": "contains", "value": "RFD-999"});
        let outcome = ContentEvaluator.evaluate(&cx(&trace), &spec).await.unwrap();
        assert_eq!(outcome.status, AssertionStatus::Pass);
    }
}
