use thiserror::Error;

/// Failures from LLM and embedding providers.
///
/// The variant decides retryability: rate limits, timeouts, transient network
/// failures and upstream 5xx are worth a naive retry; everything else is not.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("{provider} rate limited the request: {detail}")]
    RateLimited { provider: String, detail: String },

    #[error("{provider} request timed out")]
    Timeout { provider: String },

    #[error("network error talking to {provider}: {detail}")]
    Network { provider: String, detail: String },

    #[error("{provider} server error (status {status}): {detail}")]
    Server {
        provider: String,
        status: u16,
        detail: String,
    },

    #[error("{provider} returned a malformed response: {detail}")]
    Malformed { provider: String, detail: String },

    #[error("mock responses exhausted after {consumed} calls")]
    Exhausted { consumed: usize },

    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. }
                | ProviderError::Timeout { .. }
                | ProviderError::Network { .. }
                | ProviderError::Server { .. }
        )
    }

    /// Classify a transport error from reqwest into the matching variant.
    pub fn from_reqwest(provider: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout {
                provider: provider.to_string(),
            }
        } else if err.is_connect() || err.is_request() {
            ProviderError::Network {
                provider: provider.to_string(),
                detail: err.to_string(),
            }
        } else {
            ProviderError::Other(format!("{provider}: {err}"))
        }
    }

    /// Classify a non-2xx HTTP status into the matching variant.
    pub fn from_status(provider: &str, status: u16, body: String) -> Self {
        match status {
            429 => ProviderError::RateLimited {
                provider: provider.to_string(),
                detail: body,
            },
            s if s >= 500 => ProviderError::Server {
                provider: provider.to_string(),
                status: s,
                detail: body,
            },
            s => ProviderError::Malformed {
                provider: provider.to_string(),
                detail: format!("unexpected status {s}: {body}"),
            },
        }
    }
}

/// Stable wire-level error codes.
pub mod codes {
    pub const INVALID_TRACE: i64 = 1001;
    pub const ASSERTION_ERROR: i64 = 1002;
    pub const PROVIDER_ERROR: i64 = 2001;
    pub const ENGINE_ERROR: i64 = 3001;
    pub const TIMEOUT: i64 = 3002;
    pub const SESSION_ERROR: i64 = 3003;
}

/// Request-scope failures surfaced over the RPC channel.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid trace: {0}")]
    InvalidTrace(String),

    #[error("assertion error: {0}")]
    Assertion(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("engine error: {0}")]
    Internal(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("session error: {0}")]
    Session(String),
}

impl EngineError {
    pub fn code(&self) -> i64 {
        match self {
            EngineError::InvalidTrace(_) => codes::INVALID_TRACE,
            EngineError::Assertion(_) => codes::ASSERTION_ERROR,
            EngineError::Provider(_) => codes::PROVIDER_ERROR,
            EngineError::Internal(_) => codes::ENGINE_ERROR,
            EngineError::Timeout(_) => codes::TIMEOUT,
            EngineError::Session(_) => codes::SESSION_ERROR,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            EngineError::InvalidTrace(_) => "INVALID_TRACE",
            EngineError::Assertion(_) => "ASSERTION_ERROR",
            EngineError::Provider(_) => "PROVIDER_ERROR",
            EngineError::Internal(_) => "ENGINE_ERROR",
            EngineError::Timeout(_) => "TIMEOUT",
            EngineError::Session(_) => "SESSION_ERROR",
        }
    }

    /// Whether a naive client retry might succeed.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Provider(_) | EngineError::Timeout(_)
        )
    }
}
