pub mod constraint;
pub mod content;
pub mod embedding;
pub mod llm_judge;
pub mod path;
pub mod plugin;
pub mod schema;
pub mod trace;
pub mod trace_tree;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::model::AssertionStatus;
use crate::providers::embedder::Embedder;
use crate::providers::llm::LlmProvider;
use crate::trace::Trace;

/// Everything an evaluator may reach during a batch. Provider handles are
/// session-owned and shared; absence means the matching assertion kinds
/// hard-fail with a configuration message.
pub struct EvalContext<'a> {
    pub trace: &'a Trace,
    pub llm: Option<Arc<dyn LlmProvider>>,
    pub embedder: Option<Arc<dyn Embedder>>,
}

/// Evaluator verdict; the pipeline attaches the assertion id and stamps the
/// measured duration.
#[derive(Debug, Clone)]
pub struct EvalOutcome {
    pub status: AssertionStatus,
    pub score: f64,
    pub explanation: String,
    pub cost: f64,
}

impl EvalOutcome {
    pub fn hard_fail(explanation: impl Into<String>) -> Self {
        Self {
            status: AssertionStatus::HardFail,
            score: 0.0,
            explanation: explanation.into(),
            cost: 0.0,
        }
    }
}

/// Predicate verdict honoring the spec's `soft` flag. Evaluation *errors*
/// never pass through here; they always become hard failures.
pub(crate) fn verdict(soft: bool, passed: bool, score: f64, explanation: String) -> EvalOutcome {
    let status = if passed {
        AssertionStatus::Pass
    } else if soft {
        AssertionStatus::SoftFail
    } else {
        AssertionStatus::HardFail
    };
    EvalOutcome {
        status,
        score,
        explanation,
        cost: 0.0,
    }
}

pub(crate) fn soft_flag(spec: &serde_json::Value) -> bool {
    spec.get("soft").and_then(|v| v.as_bool()).unwrap_or(false)
}

/// One assertion kind. Implementations return `Err` only for evaluation
/// errors (malformed spec, provider failure, missing data); the pipeline
/// converts those into hard failures.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(
        &self,
        cx: &EvalContext<'_>,
        spec: &serde_json::Value,
    ) -> anyhow::Result<EvalOutcome>;
}

/// Kinds declared side-effect-free: these may evaluate concurrently within a
/// batch. Embedding, llm_judge and plugin stay sequential for deterministic
/// cost accounting and plugin-response matching.
pub const PURE_KINDS: &[&str] = &["schema", "constraint", "trace", "content", "trace_tree"];

pub fn is_pure(kind: &str) -> bool {
    PURE_KINDS.contains(&kind)
}

/// Maps each assertion `type` to its evaluator.
pub struct Registry {
    evaluators: HashMap<String, Arc<dyn Evaluator>>,
}

impl Registry {
    pub fn empty() -> Self {
        Self {
            evaluators: HashMap::new(),
        }
    }

    /// Registry with all eight built-in kinds.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("schema", Arc::new(schema::SchemaEvaluator));
        registry.register("constraint", Arc::new(constraint::ConstraintEvaluator));
        registry.register("trace", Arc::new(trace::TraceEvaluator));
        registry.register("content", Arc::new(content::ContentEvaluator));
        registry.register("embedding", Arc::new(embedding::EmbeddingEvaluator));
        registry.register("llm_judge", Arc::new(llm_judge::LlmJudgeEvaluator));
        registry.register("trace_tree", Arc::new(trace_tree::TraceTreeEvaluator));
        registry.register("plugin", Arc::new(plugin::PluginEvaluator));
        registry
    }

    pub fn register(&mut self, kind: impl Into<String>, evaluator: Arc<dyn Evaluator>) {
        self.evaluators.insert(kind.into(), evaluator);
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn Evaluator>> {
        self.evaluators.get(kind).cloned()
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.evaluators.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_cover_all_eight_kinds() {
        let registry = Registry::with_builtins();
        for kind in [
            "schema",
            "constraint",
            "trace",
            "content",
            "embedding",
            "llm_judge",
            "trace_tree",
            "plugin",
        ] {
            assert!(registry.get(kind).is_some(), "missing builtin: {kind}");
        }
        assert!(registry.get("telepathy").is_none());
    }

    #[test]
    fn purity_split_matches_the_stateful_kinds() {
        for kind in PURE_KINDS {
            assert!(is_pure(kind));
        }
        assert!(!is_pure("embedding"));
        assert!(!is_pure("llm_judge"));
        assert!(!is_pure("plugin"));
    }

    #[test]
    fn verdict_honors_soft_flag_for_predicate_failures() {
        assert_eq!(
            verdict(true, false, 0.0, String::new()).status,
            AssertionStatus::SoftFail
        );
        assert_eq!(
            verdict(false, false, 0.0, String::new()).status,
            AssertionStatus::HardFail
        );
        assert_eq!(
            verdict(true, true, 1.0, String::new()).status,
            AssertionStatus::Pass
        );
    }
}
