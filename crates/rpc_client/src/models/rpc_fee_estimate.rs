use serde::{Deserialize, Serialize};

/// Result of `estimatesmartfee`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SmartFeeEstimate {
    /// BTC per kvB; absent when the node has too little data
    pub feerate: Option<f64>,
    pub blocks: u32,
    pub errors: Vec<String>,
}

impl SmartFeeEstimate {
    /// Fee rate in sat/vB, 0.0 when no estimate is available
    pub fn sat_per_vbyte(&self) -> f64 {
        match self.feerate {
            Some(rate) if rate > 0.0 => rate * 1e8 / 1000.0,
            _ => 0.0,
        }
    }
}
