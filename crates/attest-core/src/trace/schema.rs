use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One execution trace produced by a client test run.
///
/// Traces compose into trees: an `agent_call` step may carry a full child
/// trace in `sub_trace`, and the child points back via `parent_trace_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trace {
    pub schema_version: u32,
    pub trace_id: String,
    pub agent_id: String,
    #[serde(default)]
    pub input: serde_json::Value,
    #[serde(default)]
    pub output: serde_json::Value,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TraceMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_trace_id: Option<String>,
}

impl Trace {
    /// Minimal well-formed trace; tests and the simulator build on this.
    pub fn new(trace_id: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            schema_version: 1,
            trace_id: trace_id.into(),
            agent_id: agent_id.into(),
            input: serde_json::Value::Null,
            output: serde_json::Value::Null,
            steps: Vec::new(),
            metadata: None,
            parent_trace_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    LlmCall,
    ToolCall,
    Retrieval,
    AgentCall,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
    #[serde(default)]
    pub result: serde_json::Value,
    /// Only meaningful for `agent_call` steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_trace: Option<Box<Trace>>,
}

impl Step {
    pub fn tool_call(name: impl Into<String>) -> Self {
        Self {
            step_type: StepType::ToolCall,
            name: name.into(),
            args: serde_json::Value::Null,
            result: serde_json::Value::Null,
            sub_trace: None,
        }
    }

    pub fn agent_call(name: impl Into<String>, sub_trace: Trace) -> Self {
        Self {
            step_type: StepType::AgentCall,
            name: name.into(),
            args: serde_json::Value::Null,
            result: serde_json::Value::Null,
            sub_trace: Some(Box::new(sub_trace)),
        }
    }
}

/// Per-trace metrics.
///
/// The `aggregate_*` fields and `agent_count` are derived by
/// [`crate::trace::tree::aggregate_metadata`] and never authored by clients;
/// authored values are ignored by the aggregator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TraceMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_cost_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_count: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_type_round_trips_snake_case() {
        let json = serde_json::to_string(&StepType::AgentCall).unwrap();
        assert_eq!(json, "\"agent_call\"");
        let back: StepType = serde_json::from_str("\"llm_call\"").unwrap();
        assert_eq!(back, StepType::LlmCall);
    }

    #[test]
    fn trace_deserializes_with_nested_sub_trace() {
        let json = serde_json::json!({
            "schema_version": 1,
            "trace_id": "t-root",
            "agent_id": "planner",
            "steps": [
                {
                    "type": "agent_call",
                    "name": "delegate",
                    "sub_trace": {
                        "schema_version": 1,
                        "trace_id": "t-child",
                        "agent_id": "worker",
                        "parent_trace_id": "t-root"
                    }
                }
            ]
        });
        let trace: Trace = serde_json::from_value(json).unwrap();
        let sub = trace.steps[0].sub_trace.as_ref().unwrap();
        assert_eq!(sub.agent_id, "worker");
        assert_eq!(sub.parent_trace_id.as_deref(), Some("t-root"));
    }

    #[test]
    fn unknown_step_type_is_rejected() {
        let json = serde_json::json!({
            "schema_version": 1,
            "trace_id": "t",
            "agent_id": "a",
            "steps": [{"type": "teleport", "name": "x"}]
        });
        assert!(serde_json::from_value::<Trace>(json).is_err());
    }
}
