use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use attest_core::errors::EngineError;
use attest_core::model::{Assertion, ChatMessage};
use attest_core::pipeline::{Pipeline, PluginSubmission};
use attest_core::providers::llm::LlmProvider;
use attest_core::sim::{next_user_message, FaultConfig, FaultInjector, Persona};
use attest_core::trace::{aggregate_metadata, validate, walk_preorder, Trace};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PROTOCOL_VERSION: &str = "1.0";
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["1.0"];

/// Capability tokens advertised by `initialize`. `embedding` is present only
/// when an embedding provider is configured for the session.
const BASE_CAPABILITIES: &[&str] = &[
    "schema",
    "constraint",
    "trace",
    "content",
    "llm_judge",
    "trace_tree",
    "plugin",
    "simulation",
];

#[derive(Debug, Clone)]
pub struct EngineLimits {
    pub max_concurrent_requests: usize,
    pub max_trace_size_bytes: usize,
    pub max_steps_per_trace: usize,
    pub request_timeout: Duration,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 8,
            max_trace_size_bytes: 10 * 1024 * 1024,
            max_steps_per_trace: 4096,
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct InitializeParams {
    #[serde(default)]
    sdk_name: String,
    #[serde(default)]
    sdk_version: String,
    protocol_version: String,
    #[serde(default)]
    required_capabilities: Vec<String>,
    #[serde(default)]
    preferred_encoding: Option<String>,
    /// Optional per-request timeout override, milliseconds.
    #[serde(default)]
    request_timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
struct InitializeResult {
    engine_version: &'static str,
    protocol_version: &'static str,
    capabilities: Vec<String>,
    missing: Vec<String>,
    compatible: bool,
    encoding: String,
    max_concurrent_requests: usize,
    max_trace_size_bytes: usize,
    max_steps_per_trace: usize,
}

#[derive(Debug, Deserialize)]
struct EvaluateBatchParams {
    trace: Value,
    assertions: Value,
}

#[derive(Debug, Deserialize)]
struct SubmitPluginResultParams {
    trace_id: String,
    #[serde(default)]
    #[allow(dead_code)]
    plugin_name: Option<String>,
    assertion_id: String,
    result: PluginSubmission,
}

#[derive(Debug, Deserialize)]
struct GenerateUserMessageParams {
    persona: Value,
    #[serde(default)]
    conversation_history: Vec<ChatMessage>,
    #[serde(default)]
    fault_config: Option<FaultConfig>,
}

#[derive(Debug, Default, Clone, Copy)]
struct SessionStats {
    batches_completed: u64,
    assertions_evaluated: u64,
    soft_failures: u64,
}

/// One RPC session: negotiated state, engine-wide totals, and the pipeline.
/// Everything here is session-scoped; a shutdown followed by a fresh
/// `initialize` behaves like a fresh process.
pub struct Session {
    pipeline: Pipeline,
    limits: EngineLimits,
    capabilities: Vec<String>,
    llm: Option<Arc<dyn LlmProvider>>,
    initialized: Mutex<bool>,
    request_timeout: Mutex<Duration>,
    stats: Mutex<SessionStats>,
}

impl Session {
    pub fn new(
        pipeline: Pipeline,
        llm: Option<Arc<dyn LlmProvider>>,
        embedding_available: bool,
        limits: EngineLimits,
    ) -> Self {
        let mut capabilities: Vec<String> =
            BASE_CAPABILITIES.iter().map(|s| s.to_string()).collect();
        if embedding_available {
            capabilities.push("embedding".to_string());
        }
        capabilities.sort_unstable();
        let request_timeout = Mutex::new(limits.request_timeout);
        Self {
            pipeline,
            limits,
            capabilities,
            llm,
            initialized: Mutex::new(false),
            request_timeout,
            stats: Mutex::new(SessionStats::default()),
        }
    }

    pub fn limits(&self) -> &EngineLimits {
        &self.limits
    }

    pub fn request_timeout(&self) -> Duration {
        *self.request_timeout.lock().unwrap()
    }

    pub async fn dispatch(&self, method: &str, params: Value) -> Result<Value, EngineError> {
        match method {
            "initialize" => self.initialize(params),
            "evaluate_batch" => {
                self.ensure_initialized()?;
                self.evaluate_batch(params).await
            }
            "submit_plugin_result" => {
                self.ensure_initialized()?;
                self.submit_plugin_result(params)
            }
            "generate_user_message" => {
                self.ensure_initialized()?;
                self.generate_user_message(params).await
            }
            "validate_trace_tree" => {
                self.ensure_initialized()?;
                self.validate_trace_tree(params)
            }
            "shutdown" => self.shutdown(),
            other => Err(EngineError::Internal(format!("unknown method '{other}'"))),
        }
    }

    fn ensure_initialized(&self) -> Result<(), EngineError> {
        if *self.initialized.lock().unwrap() {
            Ok(())
        } else {
            Err(EngineError::Session(
                "session not initialized: call initialize first".into(),
            ))
        }
    }

    fn initialize(&self, params: Value) -> Result<Value, EngineError> {
        let params: InitializeParams = serde_json::from_value(params)
            .map_err(|e| EngineError::Internal(format!("malformed initialize params: {e}")))?;

        let protocol_ok = SUPPORTED_PROTOCOL_VERSIONS.contains(&params.protocol_version.as_str());
        let missing: Vec<String> = params
            .required_capabilities
            .iter()
            .filter(|c| !self.capabilities.contains(c))
            .cloned()
            .collect();
        let compatible = protocol_ok && missing.is_empty();

        if compatible {
            *self.initialized.lock().unwrap() = true;
            *self.stats.lock().unwrap() = SessionStats::default();
            if let Some(timeout_ms) = params.request_timeout_ms {
                *self.request_timeout.lock().unwrap() = Duration::from_millis(timeout_ms);
            }
            tracing::info!(
                sdk_name = %params.sdk_name,
                sdk_version = %params.sdk_version,
                "session initialized"
            );
        } else {
            *self.initialized.lock().unwrap() = false;
            tracing::warn!(
                protocol_version = %params.protocol_version,
                ?missing,
                "incompatible initialize request"
            );
        }

        let result = InitializeResult {
            engine_version: ENGINE_VERSION,
            protocol_version: PROTOCOL_VERSION,
            capabilities: self.capabilities.clone(),
            missing,
            compatible,
            encoding: params
                .preferred_encoding
                .unwrap_or_else(|| "json".to_string()),
            max_concurrent_requests: self.limits.max_concurrent_requests,
            max_trace_size_bytes: self.limits.max_trace_size_bytes,
            max_steps_per_trace: self.limits.max_steps_per_trace,
        };
        Ok(serde_json::to_value(result).expect("initialize result serializes"))
    }

    async fn evaluate_batch(&self, params: Value) -> Result<Value, EngineError> {
        let params: EvaluateBatchParams = serde_json::from_value(params)
            .map_err(|e| EngineError::Internal(format!("malformed evaluate_batch params: {e}")))?;
        let trace: Trace = serde_json::from_value(params.trace)
            .map_err(|e| EngineError::InvalidTrace(format!("trace does not parse: {e}")))?;
        let assertions: Vec<Assertion> = serde_json::from_value(params.assertions)
            .map_err(|e| EngineError::Assertion(format!("assertions do not parse: {e}")))?;

        let step_count: usize = walk_preorder(&trace).map(|t| t.steps.len()).sum();
        if step_count > self.limits.max_steps_per_trace {
            return Err(EngineError::InvalidTrace(format!(
                "trace has {step_count} steps, limit is {}",
                self.limits.max_steps_per_trace
            )));
        }

        let batch = self.pipeline.evaluate_batch(trace, assertions).await?;

        {
            let mut stats = self.stats.lock().unwrap();
            stats.batches_completed += 1;
            stats.assertions_evaluated += batch.results.len() as u64;
            stats.soft_failures += batch.soft_failed() as u64;
        }
        tracing::debug!(
            assertions = batch.results.len(),
            total_cost = batch.total_cost,
            duration_ms = batch.total_duration_ms,
            "batch evaluated"
        );
        Ok(serde_json::to_value(batch).expect("batch result serializes"))
    }

    fn submit_plugin_result(&self, params: Value) -> Result<Value, EngineError> {
        let params: SubmitPluginResultParams = serde_json::from_value(params).map_err(|e| {
            EngineError::Internal(format!("malformed submit_plugin_result params: {e}"))
        })?;
        let accepted = self.pipeline.plugin_broker().submit(
            &params.trace_id,
            &params.assertion_id,
            params.result,
        );
        Ok(json!({ "accepted": accepted }))
    }

    async fn generate_user_message(&self, params: Value) -> Result<Value, EngineError> {
        let params: GenerateUserMessageParams = serde_json::from_value(params).map_err(|e| {
            EngineError::Internal(format!("malformed generate_user_message params: {e}"))
        })?;
        let persona = resolve_persona(&params.persona)?;

        let provider = self.llm.clone().ok_or_else(|| {
            EngineError::Internal("no LLM provider configured for simulation".into())
        })?;
        let provider: Arc<dyn LlmProvider> = match params.fault_config {
            Some(fault) => Arc::new(FaultInjector::new(provider, fault)),
            None => provider,
        };

        let message =
            next_user_message(provider.as_ref(), &persona, &params.conversation_history).await?;
        Ok(json!({ "message": message }))
    }

    fn validate_trace_tree(&self, params: Value) -> Result<Value, EngineError> {
        let trace_value = params
            .get("trace")
            .cloned()
            .ok_or_else(|| EngineError::InvalidTrace("missing trace".into()))?;
        let trace: Trace = serde_json::from_value(trace_value)
            .map_err(|e| EngineError::InvalidTrace(format!("trace does not parse: {e}")))?;

        let report = validate(&trace);
        let agg = aggregate_metadata(&trace);
        let mut agent_ids: Vec<String> = Vec::new();
        for t in walk_preorder(&trace) {
            if !agent_ids.contains(&t.agent_id) {
                agent_ids.push(t.agent_id.clone());
            }
        }

        Ok(json!({
            "valid": report.valid,
            "errors": report.errors,
            "depth": report.depth,
            "agent_count": agg.agent_count,
            "agent_ids": agent_ids,
            "aggregate_tokens": agg.tokens,
            "aggregate_cost_usd": agg.cost_usd,
            "aggregate_latency_ms": agg.latency_ms,
        }))
    }

    fn shutdown(&self) -> Result<Value, EngineError> {
        let stats = *self.stats.lock().unwrap();
        *self.initialized.lock().unwrap() = false;
        tracing::info!(
            batches = stats.batches_completed,
            assertions = stats.assertions_evaluated,
            soft_failures = stats.soft_failures,
            "shutdown requested"
        );
        Ok(json!({
            "sessions_completed": stats.batches_completed,
            "assertions_evaluated": stats.assertions_evaluated,
        }))
    }
}

/// Personas arrive either as a preset name or as a full persona object.
fn resolve_persona(value: &Value) -> Result<Persona, EngineError> {
    if let Some(name) = value.as_str() {
        return Persona::preset(name)
            .ok_or_else(|| EngineError::Internal(format!("unknown persona preset '{name}'")));
    }
    serde_json::from_value(value.clone())
        .map_err(|e| EngineError::Internal(format!("malformed persona: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_core::assertions::Registry;

    fn session() -> Session {
        Session::new(
            Pipeline::new(Registry::with_builtins()),
            None,
            false,
            EngineLimits::default(),
        )
    }

    #[tokio::test]
    async fn methods_require_initialize_first() {
        let session = session();
        let err = session
            .dispatch("evaluate_batch", json!({"trace": {}, "assertions": []}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), 3003);
    }

    #[tokio::test]
    async fn incompatible_protocol_does_not_initialize() {
        let session = session();
        let result = session
            .dispatch("initialize", json!({"protocol_version": "9.9"}))
            .await
            .unwrap();
        assert_eq!(result["compatible"], false);
        assert!(session.ensure_initialized().is_err());
    }

    #[tokio::test]
    async fn missing_capabilities_block_compatibility() {
        let session = session();
        let result = session
            .dispatch(
                "initialize",
                json!({
                    "protocol_version": "1.0",
                    "required_capabilities": ["embedding"]
                }),
            )
            .await
            .unwrap();
        assert_eq!(result["compatible"], false);
        assert_eq!(result["missing"][0], "embedding");
    }

    #[tokio::test]
    async fn compatible_initialize_unlocks_the_session() {
        let session = session();
        let result = session
            .dispatch(
                "initialize",
                json!({
                    "protocol_version": "1.0",
                    "required_capabilities": ["constraint", "trace_tree"],
                    "request_timeout_ms": 5000
                }),
            )
            .await
            .unwrap();
        assert_eq!(result["compatible"], true);
        assert!(session.ensure_initialized().is_ok());
        assert_eq!(session.request_timeout(), Duration::from_millis(5000));
    }

    #[tokio::test]
    async fn unknown_persona_preset_is_rejected() {
        let session = session();
        session
            .dispatch("initialize", json!({"protocol_version": "1.0"}))
            .await
            .unwrap();
        let err = session
            .dispatch("generate_user_message", json!({"persona": "GhostUser"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown persona preset"));
    }
}
