use serde::{Deserialize, Serialize};

/// Result of `getblockchaininfo`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockchainInfo {
    pub chain: String,
    /// Height of the best validated block
    pub blocks: u64,
    /// Height of the best known header; absent on some forks of Core
    pub headers: Option<u64>,
    pub verificationprogress: f64,
    pub difficulty: f64,
    pub initialblockdownload: bool,
    pub size_on_disk: u64,
}

impl BlockchainInfo {
    /// Header height, falling back to the block height when not reported
    pub fn headers_or_best(&self) -> u64 {
        self.headers.unwrap_or(self.blocks)
    }
}
