use serde::{Deserialize, Serialize};

/// Result of `getmempoolinfo`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MempoolInfo {
    /// Number of transactions
    pub size: u64,
    /// Sum of virtual sizes in bytes
    pub bytes: u64,
    pub usage: u64,
    pub mempoolminfee: f64,
}

/// Fee breakdown of a mempool entry, in BTC
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MempoolFees {
    pub base: f64,
    pub modified: f64,
}

/// One value of `getrawmempool true`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MempoolEntry {
    pub vsize: Option<u64>,
    pub weight: Option<u64>,
    pub fees: MempoolFees,
}

impl MempoolEntry {
    /// Base fee rate in sat/vB; a missing or zero vsize counts as 1
    pub fn fee_rate_sat_per_vb(&self) -> f64 {
        let vsize = self.vsize.filter(|v| *v > 0).unwrap_or(1);
        (self.fees.base * 1e8) / vsize as f64
    }
}
