//! btc-monitor Configuration Module
//!
//! This module provides the configuration types consumed by the collector,
//! TOML loading, environment overrides and RPC credential discovery.

mod autodetect;
mod env;
mod error;

pub use autodetect::{
    detect_rpc_credentials, find_cookie, read_bitcoin_conf, read_cookie, RpcCredentials,
    BITCOIN_CONF_LOCATIONS,
};
pub use env::{parse_bool, EnvLookup};
pub use error::{ConfigError, ConfigResult};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default Bitcoin Core RPC port (mainnet)
pub const DEFAULT_RPC_PORT: u16 = 8332;

/// Default fast scrape interval in seconds
pub const DEFAULT_INTERVAL_FAST: u64 = 5;
/// Default slow scrape interval in seconds
pub const DEFAULT_INTERVAL_SLOW: u64 = 30;

/// Where InfluxDB's setup container drops the operator token
pub const DEFAULT_TOKEN_FILE: &str = "/var/lib/influxdb2/.influxdbv2/token";

/// Source used to build the mempool fee histogram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HistogramSource {
    /// No histogram points are produced
    #[default]
    None,
    /// Bucket `getrawmempool true` locally
    CoreRawmempool,
    /// Read a mempool.space style fee recommendation endpoint
    MempoolApi,
}

impl fmt::Display for HistogramSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistogramSource::None => write!(f, "none"),
            HistogramSource::CoreRawmempool => write!(f, "core_rawmempool"),
            HistogramSource::MempoolApi => write!(f, "mempool_api"),
        }
    }
}

impl FromStr for HistogramSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" => Ok(HistogramSource::None),
            "core_rawmempool" => Ok(HistogramSource::CoreRawmempool),
            "mempool_api" => Ok(HistogramSource::MempoolApi),
            other => Err(format!(
                "MEMPOOL_HIST_SOURCE must be one of none, core_rawmempool, mempool_api (got '{other}')"
            )),
        }
    }
}

/// Bitcoin Core connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BitcoinSection {
    pub rpc_host: String,
    pub rpc_port: u16,
    pub rpc_user: String,
    pub rpc_password: String,
    /// Explicit cookie file, preferred over the datadir cookie
    pub rpc_cookie_path: Option<PathBuf>,
    pub rpc_timeout_secs: u64,
    /// Network label attached to every point
    pub network: String,
    pub datadir: Option<PathBuf>,
    pub chainstate_dir: Option<PathBuf>,
    /// Name of the node process for CPU/RSS sampling
    pub process_name: String,
}

impl Default for BitcoinSection {
    fn default() -> Self {
        Self {
            rpc_host: "127.0.0.1".to_string(),
            rpc_port: DEFAULT_RPC_PORT,
            rpc_user: String::new(),
            rpc_password: String::new(),
            rpc_cookie_path: None,
            rpc_timeout_secs: 10,
            network: "mainnet".to_string(),
            datadir: Some(expand_home("~/.bitcoin")),
            chainstate_dir: Some(expand_home("~/.bitcoin/chainstate")),
            process_name: "bitcoind".to_string(),
        }
    }
}

/// ZMQ notification endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZmqSection {
    pub enabled: bool,
    pub rawblock: String,
    pub rawtx: String,
}

impl Default for ZmqSection {
    fn default() -> Self {
        Self {
            enabled: false,
            rawblock: "tcp://127.0.0.1:28332".to_string(),
            rawtx: "tcp://127.0.0.1:28333".to_string(),
        }
    }
}

impl ZmqSection {
    /// Topic to endpoint pairs for the stream monitor
    pub fn topics(&self) -> Vec<(String, String)> {
        vec![
            ("rawblock".to_string(), self.rawblock.clone()),
            ("rawtx".to_string(), self.rawtx.clone()),
        ]
    }
}

/// Metrics store (InfluxDB v2) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InfluxSection {
    pub url: String,
    pub org: String,
    pub bucket: String,
    pub token: String,
    pub token_file: Option<PathBuf>,
    pub tls_verify: bool,
    pub timeout_secs: u64,
}

impl Default for InfluxSection {
    fn default() -> Self {
        Self {
            url: "http://influxdb:8086".to_string(),
            org: "bitcoin".to_string(),
            bucket: "btc_metrics".to_string(),
            token: String::new(),
            token_file: Some(PathBuf::from(DEFAULT_TOKEN_FILE)),
            tls_verify: true,
            timeout_secs: 10,
        }
    }
}

/// Cadence of the two collection cycles, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeSection {
    pub interval_fast: u64,
    pub interval_slow: u64,
}

impl Default for ScrapeSection {
    fn default() -> Self {
        Self {
            interval_fast: DEFAULT_INTERVAL_FAST,
            interval_slow: DEFAULT_INTERVAL_SLOW,
        }
    }
}

/// Optional metric families
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    pub peer_quality: bool,
    pub process_metrics: bool,
    pub disk_io: bool,
    pub peer_geo: bool,
    pub asn_stats: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            peer_quality: true,
            process_metrics: true,
            disk_io: true,
            peer_geo: true,
            asn_stats: true,
        }
    }
}

/// Mempool histogram settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MempoolSection {
    pub hist_source: HistogramSource,
    pub api_base: String,
}

impl Default for MempoolSection {
    fn default() -> Self {
        Self {
            hist_source: HistogramSource::None,
            api_base: "http://127.0.0.1:3006".to_string(),
        }
    }
}

/// Electrum indexer (Fulcrum/electrs) stats endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerSection {
    /// Empty disables indexer polling
    pub stats_url: String,
}

/// GeoLite2 database location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoIpSection {
    pub db_dir: PathBuf,
}

impl Default for GeoIpSection {
    fn default() -> Self {
        Self {
            db_dir: PathBuf::from("/usr/share/GeoIP"),
        }
    }
}

/// Logging output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    /// text, json or pretty
    pub format: String,
    pub file_path: Option<String>,
    pub console_output: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            file_path: None,
            console_output: true,
        }
    }
}

/// Collector configuration
///
/// Built once at startup and shared read-only afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub bitcoin: BitcoinSection,
    pub zmq: ZmqSection,
    pub influx: InfluxSection,
    pub scrape: ScrapeSection,
    pub features: FeatureFlags,
    pub mempool: MempoolSection,
    pub indexer: IndexerSection,
    pub geoip: GeoIpSection,
    pub logging: LoggingSection,
}

impl CollectorConfig {
    /// Loads the configuration from an optional TOML file.
    ///
    /// Sections missing from the file keep their defaults; no path yields the
    /// default configuration.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parses a TOML document.
    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        let mut config: CollectorConfig = toml::from_str(contents)?;
        config.normalize_paths();
        Ok(config)
    }

    /// Applies environment overrides using the process environment.
    pub fn apply_process_env(&mut self) -> ConfigResult<()> {
        self.apply_env_overrides(|key| std::env::var(key).ok())
    }

    /// Validates values that serde cannot express.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.scrape.interval_fast == 0 {
            return Err(ConfigError::InvalidInterval {
                key: "SCRAPE_INTERVAL_FAST",
            });
        }
        if self.scrape.interval_slow == 0 {
            return Err(ConfigError::InvalidInterval {
                key: "SCRAPE_INTERVAL_SLOW",
            });
        }
        if self.bitcoin.network.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "BITCOIN_NETWORK".to_string(),
                value: self.bitcoin.network.clone(),
                reason: "network label must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// JSON-RPC endpoint of the node
    pub fn rpc_url(&self) -> String {
        format!("http://{}:{}", self.bitcoin.rpc_host, self.bitcoin.rpc_port)
    }

    /// Explicit cookie file, only when it exists on disk
    pub fn cookie_path(&self) -> Option<PathBuf> {
        self.bitcoin
            .rpc_cookie_path
            .as_ref()
            .filter(|path| path.exists())
            .cloned()
    }

    /// Resolves the metrics store token: explicit value first, then the token file.
    pub fn influx_token(&self) -> String {
        if !self.influx.token.is_empty() {
            return self.influx.token.clone();
        }
        self.influx
            .token_file
            .as_ref()
            .and_then(|path| fs::read_to_string(path).ok())
            .map(|raw| raw.trim().to_string())
            .unwrap_or_default()
    }

    fn normalize_paths(&mut self) {
        self.bitcoin.rpc_cookie_path = normalize_path(self.bitcoin.rpc_cookie_path.take());
        self.bitcoin.datadir = normalize_path(self.bitcoin.datadir.take());
        self.bitcoin.chainstate_dir = normalize_path(self.bitcoin.chainstate_dir.take());
    }
}

/// Expands a leading `~` using `$HOME`.
pub fn expand_home(value: &str) -> PathBuf {
    if let Some(rest) = value.strip_prefix('~') {
        if let Some(home) = std::env::var_os("HOME") {
            let rest = rest.trim_start_matches('/');
            let mut path = PathBuf::from(home);
            if !rest.is_empty() {
                path.push(rest);
            }
            return path;
        }
    }
    PathBuf::from(value)
}

/// Blank paths are unset; others get `~` expansion.
fn normalize_path(value: Option<PathBuf>) -> Option<PathBuf> {
    let value = value?;
    let text = value.to_string_lossy();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(expand_home(trimmed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_reference_agent() {
        let config = CollectorConfig::default();
        assert_eq!(config.bitcoin.rpc_host, "127.0.0.1");
        assert_eq!(config.bitcoin.rpc_port, 8332);
        assert_eq!(config.scrape.interval_fast, 5);
        assert_eq!(config.scrape.interval_slow, 30);
        assert_eq!(config.mempool.hist_source, HistogramSource::None);
        assert!(!config.zmq.enabled);
        assert!(config.features.peer_quality);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = CollectorConfig::from_toml_str(
            r#"
            [bitcoin]
            network = "signet"

            [scrape]
            interval_fast = 2

            [mempool]
            hist_source = "core_rawmempool"
            "#,
        )
        .expect("parse");
        assert_eq!(config.bitcoin.network, "signet");
        assert_eq!(config.bitcoin.rpc_port, 8332);
        assert_eq!(config.scrape.interval_fast, 2);
        assert_eq!(config.scrape.interval_slow, 30);
        assert_eq!(config.mempool.hist_source, HistogramSource::CoreRawmempool);
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[influx]\nbucket = \"chain\"").expect("write");
        let config = CollectorConfig::load(Some(file.path())).expect("load");
        assert_eq!(config.influx.bucket, "chain");
        assert_eq!(config.influx.org, "bitcoin");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = CollectorConfig::load(Some(Path::new("/nonexistent/btc-monitor.toml")))
            .expect_err("missing file");
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn zero_interval_rejected() {
        let mut config = CollectorConfig::default();
        config.scrape.interval_slow = 0;
        let err = config.validate().expect_err("zero interval");
        assert!(err.to_string().contains("SCRAPE_INTERVAL_SLOW"));
    }

    #[test]
    fn histogram_source_parsing() {
        assert_eq!("".parse::<HistogramSource>(), Ok(HistogramSource::None));
        assert_eq!(
            " Mempool_API ".parse::<HistogramSource>(),
            Ok(HistogramSource::MempoolApi)
        );
        let err = "invalid".parse::<HistogramSource>().expect_err("invalid");
        assert!(err.contains("MEMPOOL_HIST_SOURCE"));
    }

    #[test]
    fn token_falls_back_to_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "  secret-token  ").expect("write");

        let mut config = CollectorConfig::default();
        config.influx.token_file = Some(file.path().to_path_buf());
        assert_eq!(config.influx_token(), "secret-token");

        config.influx.token = "explicit".to_string();
        assert_eq!(config.influx_token(), "explicit");

        config.influx.token.clear();
        config.influx.token_file = Some(PathBuf::from("/nonexistent/token"));
        assert_eq!(config.influx_token(), "");
    }

    #[test]
    fn cookie_path_requires_existing_file() {
        let file = tempfile::NamedTempFile::new().expect("temp file");
        let mut config = CollectorConfig::default();
        config.bitcoin.rpc_cookie_path = Some(file.path().to_path_buf());
        assert_eq!(config.cookie_path(), Some(file.path().to_path_buf()));

        config.bitcoin.rpc_cookie_path = Some(PathBuf::from("/nonexistent/.cookie"));
        assert_eq!(config.cookie_path(), None);
    }

    #[test]
    fn rpc_url_uses_host_and_port() {
        let mut config = CollectorConfig::default();
        config.bitcoin.rpc_host = "node".to_string();
        config.bitcoin.rpc_port = 18443;
        assert_eq!(config.rpc_url(), "http://node:18443");
    }
}
