use serde::{Deserialize, Serialize};

/// One declarative check against a trace.
///
/// The `spec` payload is opaque here; its schema is determined by `kind` and
/// parsed by the matching evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assertion {
    pub assertion_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub spec: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionStatus {
    Pass,
    SoftFail,
    HardFail,
    /// Internal only: the verdict is produced by the SDK and submitted back
    /// over the wire. The pipeline resolves this before results leave a batch.
    Pending,
}

impl AssertionStatus {
    pub fn is_failure(self) -> bool {
        matches!(self, AssertionStatus::SoftFail | AssertionStatus::HardFail)
    }
}

/// Per-assertion verdict with cost and latency accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionResult {
    pub assertion_id: String,
    pub status: AssertionStatus,
    pub score: f64,
    pub explanation: String,
    /// USD spent on provider calls made for this assertion.
    pub cost: f64,
    pub duration_ms: u64,
}

/// Result of one `evaluate_batch` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub results: Vec<AssertionResult>,
    pub total_cost: f64,
    pub total_duration_ms: u64,
}

impl BatchResult {
    pub fn passed(&self) -> usize {
        self.count(AssertionStatus::Pass)
    }

    pub fn soft_failed(&self) -> usize {
        self.count(AssertionStatus::SoftFail)
    }

    pub fn hard_failed(&self) -> usize {
        self.count(AssertionStatus::HardFail)
    }

    fn count(&self, status: AssertionStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Prompt shipped to an LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_tokens() -> u32 {
    1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// USD, computed from the published per-model token prices.
    pub cost: f64,
    pub duration_ms: u64,
}

impl CompletionResponse {
    /// Canned response for mocks and tests; zero tokens, zero cost.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: "mock-model".to_string(),
            input_tokens: 0,
            output_tokens: 0,
            cost: 0.0,
            duration_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assertion_status_serializes_snake_case() {
        let json = serde_json::to_string(&AssertionStatus::SoftFail).unwrap();
        assert_eq!(json, "\"soft_fail\"");
        let back: AssertionStatus = serde_json::from_str("\"hard_fail\"").unwrap();
        assert_eq!(back, AssertionStatus::HardFail);
    }

    #[test]
    fn assertion_spec_defaults_to_null() {
        let a: Assertion = serde_json::from_str(
            r#"{"assertion_id": "a1", "type": "constraint"}"#,
        )
        .unwrap();
        assert_eq!(a.kind, "constraint");
        assert!(a.spec.is_null());
        assert!(a.request_id.is_none());
    }

    #[test]
    fn batch_result_counts_by_status() {
        let mk = |status| AssertionResult {
            assertion_id: "a".into(),
            status,
            score: 0.0,
            explanation: String::new(),
            cost: 0.0,
            duration_ms: 0,
        };
        let batch = BatchResult {
            results: vec![
                mk(AssertionStatus::Pass),
                mk(AssertionStatus::Pass),
                mk(AssertionStatus::SoftFail),
                mk(AssertionStatus::HardFail),
            ],
            total_cost: 0.0,
            total_duration_ms: 0,
        };
        assert_eq!(batch.passed(), 2);
        assert_eq!(batch.soft_failed(), 1);
        assert_eq!(batch.hard_failed(), 1);
    }
}
