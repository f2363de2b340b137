//! Bitcoin Core RPC client
//!
//! JSON-RPC over HTTP for the node itself, plus small clients for the
//! auxiliary HTTP services the collector polls (indexer stats and a
//! mempool fee API).

pub mod error;
pub mod models;

mod fee_api;
mod indexer_client;
mod node_rpc;
mod rpc_client;

pub use error::{RpcError, ServiceError};
pub use fee_api::FeeApiClient;
pub use indexer_client::{parse_indexer_stats, IndexerClient, IndexerStats, SERVICE_TIMEOUT};
pub use node_rpc::NodeRpc;
pub use rpc_client::{RpcClient, RpcClientBuilder, DEFAULT_HTTP_TIMEOUT};

pub use models::{
    BlockchainInfo, MempoolEntry, MempoolFees, MempoolInfo, NetworkInfo, PeerInfo, RpcRequest,
    RpcResponse, RpcResponseError, SmartFeeEstimate,
};
pub use reqwest::Url;
