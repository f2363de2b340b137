use thiserror::Error;

/// Errors raised by the node RPC client
#[derive(Error, Debug)]
pub enum RpcError {
    /// The node answered with an explicit error object
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Connection, timeout or body read failure
    #[error("transport error calling {method}: {source}")]
    Transport {
        method: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status without a JSON-RPC error body
    #[error("HTTP {status} calling {method}")]
    HttpStatus { method: String, status: u16 },

    /// The body could not be decoded into the expected shape
    #[error("invalid response for {method}: {message}")]
    InvalidResponse { method: String, message: String },

    /// The HTTP client could not be constructed
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl RpcError {
    /// Creates a protocol error, as raised for `{"error": {...}}`
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        RpcError::Rpc {
            code,
            message: message.into(),
        }
    }

    /// Remote error code, if this is a protocol error
    pub fn code(&self) -> Option<i64> {
        match self {
            RpcError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Errors raised by the auxiliary HTTP services (indexer, fee API)
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("unexpected payload from {url}: {message}")]
    InvalidBody { url: String, message: String },
}
