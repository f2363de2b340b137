//! Typed request and response models for Bitcoin Core RPC
//!
//! Every field defaults when absent so that older or newer node versions
//! with slightly different payloads still decode.

mod rpc_blockchain_info;
mod rpc_fee_estimate;
mod rpc_mempool;
mod rpc_network_info;
mod rpc_peer_info;
mod rpc_request;

pub use rpc_blockchain_info::BlockchainInfo;
pub use rpc_fee_estimate::SmartFeeEstimate;
pub use rpc_mempool::{MempoolEntry, MempoolFees, MempoolInfo};
pub use rpc_network_info::NetworkInfo;
pub use rpc_peer_info::PeerInfo;
pub use rpc_request::{RpcRequest, RpcResponse, RpcResponseError};
