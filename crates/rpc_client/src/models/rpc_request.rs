use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier sent with every request
pub const REQUEST_ID: &str = "btc-monitor";

/// JSON-RPC 2.0 request envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version
    #[serde(rename = "jsonrpc")]
    pub json_rpc: String,

    /// Request ID
    pub id: String,

    /// Method name
    pub method: String,

    /// Positional parameters
    pub params: Vec<Value>,
}

impl RpcRequest {
    /// Creates a new request with the collector's id
    pub fn new(method: &str, params: Vec<Value>) -> Self {
        Self {
            json_rpc: "2.0".to_string(),
            id: REQUEST_ID.to_string(),
            method: method.to_string(),
            params,
        }
    }
}

/// Error object carried by a failed call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RpcResponseError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// JSON-RPC response envelope
///
/// `error: null` and a missing `error` both decode to `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcResponseError>,
    #[serde(default)]
    pub id: Value,
}
