use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use attest_core::assertions::Registry;
use attest_core::pipeline::Pipeline;
use attest_core::providers::embedder::{Embedder, LocalEmbedder, OpenAiEmbedder};
use attest_core::providers::llm::{
    anthropic::AnthropicProvider, gemini::GeminiProvider, huggingface::HuggingFaceProvider,
    ollama::OllamaProvider, openai::OpenAiProvider, LlmProvider, RateLimitConfig, RateLimited,
};

use attest_engine::server;
use attest_engine::session::{EngineLimits, Session};

#[derive(Debug, Parser)]
#[command(name = "attest-engine", version, about = "Evaluation engine for AI agent traces")]
struct Args {
    /// Concurrency bound for RPC dispatch.
    #[arg(long, default_value_t = 8)]
    max_concurrent_requests: usize,

    /// Per-request timeout; also configurable by the SDK via initialize.
    #[arg(long, default_value_t = 30)]
    request_timeout_secs: u64,

    /// Frames larger than this are rejected with INVALID_TRACE.
    #[arg(long, default_value_t = 10 * 1024 * 1024)]
    max_trace_size_bytes: usize,

    #[arg(long, default_value_t = 4096)]
    max_steps_per_trace: usize,

    /// How long a batch waits for submit_plugin_result callbacks.
    #[arg(long, default_value_t = 30)]
    plugin_deadline_secs: u64,

    /// Log filter override (RUST_LOG is respected otherwise).
    #[arg(long)]
    log_level: Option<String>,
}

fn init_tracing(log_level: Option<&str>) {
    let filter = match log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    // stdout carries the protocol; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn rate_limited(provider: impl LlmProvider + 'static) -> Arc<dyn LlmProvider> {
    Arc::new(RateLimited::new(provider, RateLimitConfig::default()))
}

/// First configured provider wins, in the documented credential order.
fn build_llm() -> Option<Arc<dyn LlmProvider>> {
    if let Ok(provider) = OpenAiProvider::new(None) {
        return Some(rate_limited(provider));
    }
    if let Ok(provider) = AnthropicProvider::new(None) {
        return Some(rate_limited(provider));
    }
    if let Ok(provider) = GeminiProvider::new(None) {
        return Some(rate_limited(provider));
    }
    if let Ok(provider) = HuggingFaceProvider::new(None) {
        return Some(rate_limited(provider));
    }
    if std::env::var("OLLAMA_BASE_URL").is_ok_and(|v| !v.is_empty()) {
        if let Ok(provider) = OllamaProvider::new(None) {
            return Some(rate_limited(provider));
        }
    }
    None
}

fn build_embedder() -> Option<Arc<dyn Embedder>> {
    if let Ok(embedder) = OpenAiEmbedder::new(None, None) {
        return Some(Arc::new(embedder));
    }
    match LocalEmbedder::new(None) {
        Ok(embedder) => Some(Arc::new(embedder)),
        Err(e) => {
            tracing::debug!(error = %e, "no embedding provider available");
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref());

    let llm = build_llm();
    let embedder = build_embedder();
    tracing::info!(
        llm = llm.as_ref().map(|p| p.name()).unwrap_or("none"),
        embedding = embedder.is_some(),
        "providers configured"
    );

    let mut pipeline = Pipeline::new(Registry::with_builtins())
        .with_plugin_deadline(Duration::from_secs(args.plugin_deadline_secs));
    if let Some(llm) = &llm {
        pipeline = pipeline.with_llm(llm.clone());
    }
    if let Some(embedder) = &embedder {
        pipeline = pipeline.with_embedder(embedder.clone());
    }

    let limits = EngineLimits {
        max_concurrent_requests: args.max_concurrent_requests,
        max_trace_size_bytes: args.max_trace_size_bytes,
        max_steps_per_trace: args.max_steps_per_trace,
        request_timeout: Duration::from_secs(args.request_timeout_secs),
    };
    let session = Arc::new(Session::new(pipeline, llm, embedder.is_some(), limits));

    server::run(session, tokio::io::stdin(), tokio::io::stdout()).await
}
