use crate::error::RpcError;
use crate::models::{BlockchainInfo, MempoolEntry, MempoolInfo, PeerInfo, SmartFeeEstimate};
use async_trait::async_trait;
use std::collections::HashMap;

/// Node calls made by the collection cycles
#[async_trait]
pub trait NodeRpc: Send + Sync {
    /// Chain tip, header height, sync progress and difficulty
    async fn get_blockchain_info(&self) -> Result<BlockchainInfo, RpcError>;

    async fn get_mempool_info(&self) -> Result<MempoolInfo, RpcError>;

    async fn get_peer_info(&self) -> Result<Vec<PeerInfo>, RpcError>;

    /// Every mempool transaction with its fee and vsize
    async fn get_raw_mempool_verbose(&self) -> Result<HashMap<String, MempoolEntry>, RpcError>;

    async fn estimate_smart_fee(&self, blocks: u32) -> Result<SmartFeeEstimate, RpcError>;
}
