use crate::error::RpcError;
use crate::models::{
    BlockchainInfo, MempoolEntry, MempoolInfo, NetworkInfo, PeerInfo, RpcRequest, RpcResponse,
    SmartFeeEstimate,
};
use crate::node_rpc::NodeRpc;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::trace;

/// Default per-request timeout
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Builder for [`RpcClient`]
#[derive(Debug, Clone)]
pub struct RpcClientBuilder {
    url: Url,
    credentials: Option<(String, String)>,
    timeout: Duration,
}

impl RpcClientBuilder {
    /// Starts a builder for the given endpoint
    pub fn new(url: Url) -> Self {
        Self {
            url,
            credentials: None,
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Sets basic auth credentials
    #[must_use]
    pub fn with_auth(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.credentials = Some((user.into(), pass.into()));
        self
    }

    /// Sets basic auth credentials when both halves are present
    #[must_use]
    pub fn with_optional_auth(self, user: Option<String>, pass: Option<String>) -> Self {
        match (user, pass) {
            (Some(user), Some(pass)) => self.with_auth(user, pass),
            _ => self,
        }
    }

    /// Overrides the per-request timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the client
    pub fn build(self) -> Result<RpcClient, RpcError> {
        let http_client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(RpcError::Client)?;
        Ok(RpcClient {
            base_address: self.url,
            http_client,
            credentials: self.credentials,
        })
    }
}

/// JSON-RPC client for a Bitcoin Core node
pub struct RpcClient {
    base_address: Url,
    http_client: Client,
    credentials: Option<(String, String)>,
}

impl RpcClient {
    /// Creates a configurable builder for the RPC client
    #[must_use]
    pub fn builder(url: Url) -> RpcClientBuilder {
        RpcClientBuilder::new(url)
    }

    /// Endpoint this client talks to
    pub fn url(&self) -> &Url {
        &self.base_address
    }

    /// Whether basic auth is attached to requests
    pub fn has_auth(&self) -> bool {
        self.credentials.is_some()
    }

    /// Calls `method` and decodes its `result`.
    ///
    /// The body is inspected before the HTTP status: Core reports RPC
    /// failures as HTTP 500 with a JSON error object, and that object is the
    /// more useful error.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, RpcError> {
        let request = RpcRequest::new(method, params);
        trace!(method, "rpc call");

        let mut builder = self.http_client.post(self.base_address.clone()).json(&request);
        if let Some((user, pass)) = &self.credentials {
            builder = builder.basic_auth(user, Some(pass));
        }

        let response = builder.send().await.map_err(|source| RpcError::Transport {
            method: method.to_string(),
            source,
        })?;
        let status = response.status();
        let content = response.text().await.map_err(|source| RpcError::Transport {
            method: method.to_string(),
            source,
        })?;

        let parsed = serde_json::from_str::<RpcResponse>(&content);
        if let Ok(RpcResponse {
            error: Some(error), ..
        }) = &parsed
        {
            return Err(RpcError::Rpc {
                code: error.code.unwrap_or(-1),
                message: error
                    .message
                    .clone()
                    .unwrap_or_else(|| "Unknown".to_string()),
            });
        }

        if !status.is_success() {
            return Err(RpcError::HttpStatus {
                method: method.to_string(),
                status: status.as_u16(),
            });
        }

        let response = parsed.map_err(|err| RpcError::InvalidResponse {
            method: method.to_string(),
            message: err.to_string(),
        })?;

        serde_json::from_value(response.result.unwrap_or(Value::Null)).map_err(|err| {
            RpcError::InvalidResponse {
                method: method.to_string(),
                message: err.to_string(),
            }
        })
    }

    /// `getblockchaininfo`
    pub async fn get_blockchain_info(&self) -> Result<BlockchainInfo, RpcError> {
        self.call("getblockchaininfo", vec![]).await
    }

    /// `getmempoolinfo`
    pub async fn get_mempool_info(&self) -> Result<MempoolInfo, RpcError> {
        self.call("getmempoolinfo", vec![]).await
    }

    /// `getpeerinfo`
    pub async fn get_peer_info(&self) -> Result<Vec<PeerInfo>, RpcError> {
        self.call("getpeerinfo", vec![]).await
    }

    /// `getrawmempool true`, keyed by txid
    pub async fn get_raw_mempool_verbose(
        &self,
    ) -> Result<HashMap<String, MempoolEntry>, RpcError> {
        self.call("getrawmempool", vec![json!(true)]).await
    }

    /// `estimatesmartfee <blocks>`
    pub async fn estimate_smart_fee(&self, blocks: u32) -> Result<SmartFeeEstimate, RpcError> {
        self.call("estimatesmartfee", vec![json!(blocks)]).await
    }

    /// `getnetworkinfo`
    pub async fn get_network_info(&self) -> Result<NetworkInfo, RpcError> {
        self.call("getnetworkinfo", vec![]).await
    }
}

#[async_trait]
impl NodeRpc for RpcClient {
    async fn get_blockchain_info(&self) -> Result<BlockchainInfo, RpcError> {
        RpcClient::get_blockchain_info(self).await
    }

    async fn get_mempool_info(&self) -> Result<MempoolInfo, RpcError> {
        RpcClient::get_mempool_info(self).await
    }

    async fn get_peer_info(&self) -> Result<Vec<PeerInfo>, RpcError> {
        RpcClient::get_peer_info(self).await
    }

    async fn get_raw_mempool_verbose(&self) -> Result<HashMap<String, MempoolEntry>, RpcError> {
        RpcClient::get_raw_mempool_verbose(self).await
    }

    async fn estimate_smart_fee(&self, blocks: u32) -> Result<SmartFeeEstimate, RpcError> {
        RpcClient::estimate_smart_fee(self, blocks).await
    }
}
