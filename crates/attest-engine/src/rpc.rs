use serde::{Deserialize, Serialize};
use serde_json::Value;

use attest_core::EngineError;

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct Response {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, err: &EngineError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(RpcError::from(err)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    pub data: RpcErrorData,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcErrorData {
    pub error_type: String,
    pub retryable: bool,
    pub detail: String,
}

impl From<&EngineError> for RpcError {
    fn from(err: &EngineError) -> Self {
        Self {
            code: err.code(),
            message: err.error_type().to_string(),
            data: RpcErrorData {
                error_type: err.error_type().to_string(),
                retryable: err.retryable(),
                detail: err.to_string(),
            },
        }
    }
}
