use serde::{Deserialize, Serialize};

/// Subset of `getnetworkinfo` used by the health check
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkInfo {
    pub version: u64,
    pub subversion: String,
    pub connections: u64,
    pub networkactive: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_with_missing_fields() {
        let info: NetworkInfo =
            serde_json::from_str(r#"{"version": 270000, "subversion": "/Satoshi:27.0.0/"}"#)
                .expect("decode");
        assert_eq!(info.version, 270_000);
        assert_eq!(info.subversion, "/Satoshi:27.0.0/");
        assert_eq!(info.connections, 0);
    }
}
