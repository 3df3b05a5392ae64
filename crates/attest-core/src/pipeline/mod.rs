use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::assertions::{is_pure, EvalContext, EvalOutcome, Registry};
use crate::errors::EngineError;
use crate::model::{Assertion, AssertionResult, AssertionStatus, BatchResult};
use crate::providers::embedder::Embedder;
use crate::providers::llm::LlmProvider;
use crate::trace::{validate, Trace};

pub const DEFAULT_PLUGIN_DEADLINE: Duration = Duration::from_secs(30);

/// Verdict submitted by the SDK for a plugin assertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSubmission {
    pub status: AssertionStatus,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

enum Slot {
    Waiting(oneshot::Sender<PluginSubmission>),
    Ready(PluginSubmission),
}

/// Rendezvous between pending plugin assertions and
/// `submit_plugin_result` calls, keyed by `(trace_id, assertion_id)`.
/// Submissions may arrive before the pipeline starts waiting.
#[derive(Default)]
pub struct PluginBroker {
    slots: Mutex<HashMap<(String, String), Slot>>,
}

impl PluginBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribe(&self, trace_id: &str, assertion_id: &str) -> oneshot::Receiver<PluginSubmission> {
        let key = (trace_id.to_string(), assertion_id.to_string());
        let (tx, rx) = oneshot::channel();
        let mut slots = self.slots.lock().unwrap();
        match slots.remove(&key) {
            Some(Slot::Ready(submission)) => {
                let _ = tx.send(submission);
            }
            // A previous waiter for the same key is replaced; its receiver
            // resolves with a closed-channel error and times out upstream.
            _ => {
                slots.insert(key, Slot::Waiting(tx));
            }
        }
        rx
    }

    /// Returns whether the submission was accepted (first submission for the
    /// key wins; duplicates are rejected).
    pub fn submit(&self, trace_id: &str, assertion_id: &str, result: PluginSubmission) -> bool {
        let key = (trace_id.to_string(), assertion_id.to_string());
        let mut slots = self.slots.lock().unwrap();
        match slots.remove(&key) {
            Some(Slot::Waiting(tx)) => {
                let _ = tx.send(result);
                true
            }
            Some(ready @ Slot::Ready(_)) => {
                slots.insert(key, ready);
                false
            }
            None => {
                slots.insert(key, Slot::Ready(result));
                true
            }
        }
    }
}

/// Batch evaluation: dispatch by kind, per-assertion timing and cost,
/// insertion-order results.
pub struct Pipeline {
    registry: Arc<Registry>,
    llm: Option<Arc<dyn LlmProvider>>,
    embedder: Option<Arc<dyn Embedder>>,
    plugin_broker: Arc<PluginBroker>,
    plugin_deadline: Duration,
}

impl Pipeline {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: Arc::new(registry),
            llm: None,
            embedder: None,
            plugin_broker: Arc::new(PluginBroker::new()),
            plugin_deadline: DEFAULT_PLUGIN_DEADLINE,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_plugin_deadline(mut self, deadline: Duration) -> Self {
        self.plugin_deadline = deadline;
        self
    }

    /// Shared handle for the RPC layer to resolve plugin assertions.
    pub fn plugin_broker(&self) -> Arc<PluginBroker> {
        self.plugin_broker.clone()
    }

    pub async fn evaluate_batch(
        &self,
        trace: Trace,
        assertions: Vec<Assertion>,
    ) -> Result<BatchResult, EngineError> {
        let report = validate(&trace);
        if !report.valid {
            return Err(EngineError::InvalidTrace(report.errors.join("; ")));
        }

        let batch_start = Instant::now();
        let trace = Arc::new(trace);

        // Side-effect-free kinds start concurrently; stateful kinds run
        // sequentially below in insertion order.
        let mut concurrent: HashMap<usize, JoinHandle<AssertionResult>> = HashMap::new();
        for (idx, assertion) in assertions.iter().enumerate() {
            if is_pure(&assertion.kind) && self.registry.get(&assertion.kind).is_some() {
                let registry = self.registry.clone();
                let trace = trace.clone();
                let assertion = assertion.clone();
                concurrent.insert(
                    idx,
                    tokio::spawn(async move {
                        evaluate_one(&registry, None, None, &trace, &assertion).await
                    }),
                );
            }
        }

        let mut sequential: HashMap<usize, AssertionResult> = HashMap::new();
        for (idx, assertion) in assertions.iter().enumerate() {
            if concurrent.contains_key(&idx) {
                continue;
            }
            let mut result = evaluate_one(
                &self.registry,
                self.llm.clone(),
                self.embedder.clone(),
                &trace,
                assertion,
            )
            .await;
            if result.status == AssertionStatus::Pending {
                result = self.await_plugin(&trace.trace_id, assertion, result).await;
            }
            sequential.insert(idx, result);
        }

        let mut results = Vec::with_capacity(assertions.len());
        for (idx, assertion) in assertions.iter().enumerate() {
            let result = if let Some(handle) = concurrent.remove(&idx) {
                match handle.await {
                    Ok(result) => result,
                    Err(e) => AssertionResult {
                        assertion_id: assertion.assertion_id.clone(),
                        status: AssertionStatus::HardFail,
                        score: 0.0,
                        explanation: format!("evaluation task failed: {e}"),
                        cost: 0.0,
                        duration_ms: 0,
                    },
                }
            } else {
                sequential.remove(&idx).expect("sequential result present")
            };
            results.push(result);
        }

        let total_cost = results.iter().map(|r| r.cost).sum();
        Ok(BatchResult {
            results,
            total_cost,
            total_duration_ms: batch_start.elapsed().as_millis() as u64,
        })
    }

    async fn await_plugin(
        &self,
        trace_id: &str,
        assertion: &Assertion,
        pending: AssertionResult,
    ) -> AssertionResult {
        let rx = self
            .plugin_broker
            .subscribe(trace_id, &assertion.assertion_id);
        match tokio::time::timeout(self.plugin_deadline, rx).await {
            Ok(Ok(submission)) => AssertionResult {
                assertion_id: assertion.assertion_id.clone(),
                status: submission.status,
                score: submission.score,
                explanation: submission.explanation,
                cost: 0.0,
                duration_ms: pending.duration_ms,
            },
            _ => AssertionResult {
                assertion_id: assertion.assertion_id.clone(),
                status: AssertionStatus::HardFail,
                score: 0.0,
                explanation: "plugin result not submitted".to_string(),
                cost: 0.0,
                duration_ms: pending.duration_ms,
            },
        }
    }
}

async fn evaluate_one(
    registry: &Registry,
    llm: Option<Arc<dyn LlmProvider>>,
    embedder: Option<Arc<dyn Embedder>>,
    trace: &Trace,
    assertion: &Assertion,
) -> AssertionResult {
    let started = Instant::now();
    let cx = EvalContext {
        trace,
        llm,
        embedder,
    };
    let outcome = match registry.get(&assertion.kind) {
        None => EvalOutcome::hard_fail("unknown assertion type"),
        Some(evaluator) => match evaluator.evaluate(&cx, &assertion.spec).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::debug!(
                    assertion_id = %assertion.assertion_id,
                    kind = %assertion.kind,
                    error = %e,
                    "assertion evaluation errored"
                );
                EvalOutcome::hard_fail(e.to_string())
            }
        },
    };
    AssertionResult {
        assertion_id: assertion.assertion_id.clone(),
        status: outcome.status,
        score: outcome.score,
        explanation: outcome.explanation,
        cost: outcome.cost,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}
