//! Environment variable overrides
//!
//! Variable names follow the deployment files of the monitoring stack
//! (`BITCOIN_RPC_HOST`, `INFLUX_URL`, ...). Lookups go through a closure so
//! callers decide where values come from.

use crate::{expand_home, CollectorConfig, ConfigError, ConfigResult, HistogramSource};
use std::path::PathBuf;
use std::str::FromStr;

/// Source of environment values
pub trait EnvLookup: Fn(&str) -> Option<String> {}

impl<F> EnvLookup for F where F: Fn(&str) -> Option<String> {}

/// Parses the boolean spellings accepted in deployment files.
pub fn parse_bool(key: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: "must be one of: 1, 0, true, false, yes, no, on, off".to_string(),
        }),
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: "expected an integer".to_string(),
        })
}

fn parse_path(value: &str) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(expand_home(trimmed))
    }
}

impl CollectorConfig {
    /// Overrides fields with values found through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl EnvLookup) -> ConfigResult<()> {
        let get = |key: &str| lookup(key);

        if let Some(v) = get("BITCOIN_RPC_HOST") {
            self.bitcoin.rpc_host = v;
        }
        if let Some(v) = get("BITCOIN_RPC_PORT") {
            self.bitcoin.rpc_port = parse_number("BITCOIN_RPC_PORT", &v)?;
        }
        if let Some(v) = get("BITCOIN_RPC_USER") {
            self.bitcoin.rpc_user = v;
        }
        if let Some(v) = get("BITCOIN_RPC_PASSWORD") {
            self.bitcoin.rpc_password = v;
        }
        if let Some(v) = get("BITCOIN_RPC_COOKIE_PATH") {
            self.bitcoin.rpc_cookie_path = parse_path(&v);
        }
        if let Some(v) = get("BITCOIN_NETWORK") {
            self.bitcoin.network = v;
        }
        if let Some(v) = get("BITCOIN_DATADIR") {
            self.bitcoin.datadir = parse_path(&v);
        }
        if let Some(v) = get("BITCOIN_CHAINSTATE_DIR") {
            self.bitcoin.chainstate_dir = parse_path(&v);
        }
        if let Some(v) = get("BITCOIN_PROCESS_NAME") {
            self.bitcoin.process_name = v;
        }

        if let Some(v) = get("BITCOIN_ZMQ_RAWBLOCK") {
            self.zmq.rawblock = v;
        }
        if let Some(v) = get("BITCOIN_ZMQ_RAWTX") {
            self.zmq.rawtx = v;
        }
        if let Some(v) = get("ENABLE_ZMQ") {
            self.zmq.enabled = parse_bool("ENABLE_ZMQ", &v)?;
        }

        if let Some(v) = get("FULCRUM_STATS_URL") {
            self.indexer.stats_url = v.trim().to_string();
        }

        if let Some(v) = get("INFLUX_URL") {
            self.influx.url = v;
        }
        if let Some(v) = get("INFLUX_ORG") {
            self.influx.org = v;
        }
        if let Some(v) = get("INFLUX_BUCKET") {
            self.influx.bucket = v;
        }
        if let Some(v) = get("INFLUX_TOKEN") {
            self.influx.token = v;
        }
        if let Some(v) = get("INFLUX_TLS_VERIFY") {
            self.influx.tls_verify = parse_bool("INFLUX_TLS_VERIFY", &v)?;
        }

        if let Some(v) = get("SCRAPE_INTERVAL_FAST") {
            self.scrape.interval_fast = parse_number("SCRAPE_INTERVAL_FAST", &v)?;
        }
        if let Some(v) = get("SCRAPE_INTERVAL_SLOW") {
            self.scrape.interval_slow = parse_number("SCRAPE_INTERVAL_SLOW", &v)?;
        }

        for (key, flag) in [
            ("ENABLE_PEER_QUALITY", &mut self.features.peer_quality),
            ("ENABLE_PROCESS_METRICS", &mut self.features.process_metrics),
            ("ENABLE_DISK_IO", &mut self.features.disk_io),
            ("ENABLE_PEER_GEO", &mut self.features.peer_geo),
            ("ENABLE_ASN_STATS", &mut self.features.asn_stats),
        ] {
            if let Some(v) = get(key) {
                *flag = parse_bool(key, &v)?;
            }
        }

        if let Some(v) = get("MEMPOOL_HIST_SOURCE") {
            self.mempool.hist_source =
                HistogramSource::from_str(&v).map_err(|reason| ConfigError::InvalidValue {
                    key: "MEMPOOL_HIST_SOURCE".to_string(),
                    value: v.clone(),
                    reason,
                })?;
        }
        if let Some(v) = get("MEMPOOL_API_BASE") {
            self.mempool.api_base = v;
        }

        if let Some(v) = get("GEOIP_DB_DIR") {
            if let Some(path) = parse_path(&v) {
                self.geoip.db_dir = path;
            }
        }

        if let Some(v) = get("COLLECTOR_LOG_LEVEL") {
            self.logging.level = v.trim().to_lowercase();
        }

        Ok(())
    }
}
