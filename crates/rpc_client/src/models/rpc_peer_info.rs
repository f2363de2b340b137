use serde::{Deserialize, Serialize};

/// One entry of `getpeerinfo`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerInfo {
    pub id: i64,
    /// `host:port`, `[v6]:port` or an onion/i2p address
    pub addr: String,
    pub inbound: bool,
    /// Last ping round trip in seconds
    pub pingtime: Option<f64>,
    pub subver: String,
    pub connection_type: Option<String>,
}
