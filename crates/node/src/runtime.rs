//! Wiring of clients, resolvers and the collector service from configuration

use anyhow::{Context, Result};
use btc_monitor_config::{CollectorConfig, HistogramSource, RpcCredentials};
use btc_monitor_rpc_client::{FeeApiClient, IndexerClient, RpcClient, Url};
use btc_monitoring::{
    Collector, CollectorService, CollectorSettings, GeoResolver, LineProtocolWriter,
    MaxMindResolver, NullResolver, StreamMonitor, SysinfoProbe, WriterOptions, ZmqSubscriber,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub fn build_rpc_client(
    config: &CollectorConfig,
    credentials: Option<RpcCredentials>,
) -> Result<RpcClient> {
    let url = Url::parse(&config.rpc_url())
        .with_context(|| format!("invalid RPC URL {}", config.rpc_url()))?;
    let (user, pass) = match credentials {
        Some(creds) => (Some(creds.username), Some(creds.password)),
        None => (None, None),
    };
    RpcClient::builder(url)
        .with_optional_auth(user, pass)
        .timeout(Duration::from_secs(config.bitcoin.rpc_timeout_secs.max(1)))
        .build()
        .context("failed to build RPC client")
}

pub fn build_writer(config: &CollectorConfig) -> Result<LineProtocolWriter> {
    let token = config.influx_token();
    if token.is_empty() {
        warn!(target: "btc_monitor", "no InfluxDB token configured, writes are unauthenticated");
    }
    LineProtocolWriter::new(WriterOptions::from_config(&config.influx, token))
        .context("failed to build metrics writer")
}

fn build_indexer(config: &CollectorConfig) -> Result<Option<IndexerClient>> {
    let raw = config.indexer.stats_url.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    let url = Url::parse(raw).with_context(|| format!("invalid indexer stats URL {raw}"))?;
    Ok(Some(
        IndexerClient::new(url).context("failed to build indexer client")?,
    ))
}

fn build_fee_api(config: &CollectorConfig) -> Result<Option<FeeApiClient>> {
    if config.mempool.hist_source != HistogramSource::MempoolApi {
        return Ok(None);
    }
    let client = FeeApiClient::new(&config.mempool.api_base)
        .with_context(|| format!("invalid mempool API base {}", config.mempool.api_base))?;
    Ok(Some(client))
}

fn build_geo_resolver(config: &CollectorConfig) -> Arc<dyn GeoResolver> {
    if !(config.features.peer_geo || config.features.asn_stats) {
        return Arc::new(NullResolver);
    }
    let resolver = MaxMindResolver::open(&config.geoip.db_dir);
    if !resolver.is_configured() {
        info!(
            target: "btc_monitor",
            dir = %config.geoip.db_dir.display(),
            "no GeoLite2 databases found, peer geography disabled"
        );
    }
    Arc::new(resolver)
}

/// Builds the service; nothing is started yet
pub fn build_service(config: &CollectorConfig, rpc: Arc<RpcClient>) -> Result<CollectorService> {
    let writer = Arc::new(build_writer(config)?);

    let mut collector = Collector::new(CollectorSettings::from_config(config), rpc, writer)
        .with_indexer(build_indexer(config)?)
        .with_fee_api(build_fee_api(config)?)
        .with_geo_resolver(build_geo_resolver(config));

    if config.features.process_metrics || config.features.disk_io {
        collector = collector.with_system_probe(Arc::new(SysinfoProbe::new()));
    }

    let monitor = config.zmq.enabled.then(|| {
        Arc::new(StreamMonitor::new(
            config.zmq.topics(),
            Arc::new(ZmqSubscriber),
        ))
    });
    if let Some(monitor) = &monitor {
        collector = collector.with_streams(monitor.status_handle());
    }

    let mut service = CollectorService::new(
        Arc::new(collector),
        Duration::from_secs(config.scrape.interval_fast),
        Duration::from_secs(config.scrape.interval_slow),
    );
    if let Some(monitor) = monitor {
        service = service.with_stream_monitor(monitor);
    }
    Ok(service)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_config() -> CollectorConfig {
        let mut config = CollectorConfig::default();
        config.influx.token = "test-token".to_string();
        config.geoip.db_dir = std::env::temp_dir().join("btc-monitor-no-geoip");
        config
    }

    #[test]
    fn rpc_client_uses_detected_credentials() {
        let config = quiet_config();
        let client = build_rpc_client(
            &config,
            Some(RpcCredentials {
                username: "__cookie__".to_string(),
                password: "abc".to_string(),
            }),
        )
        .expect("client");
        assert!(client.has_auth());
        assert_eq!(client.url().as_str(), "http://127.0.0.1:8332/");

        let anonymous = build_rpc_client(&config, None).expect("client");
        assert!(!anonymous.has_auth());
    }

    #[test]
    fn indexer_is_optional() {
        let mut config = quiet_config();
        assert!(build_indexer(&config).expect("no indexer").is_none());

        config.indexer.stats_url = "http://127.0.0.1:8000/stats".to_string();
        assert!(build_indexer(&config).expect("indexer").is_some());

        config.indexer.stats_url = "not a url".to_string();
        assert!(build_indexer(&config).is_err());
    }

    #[test]
    fn fee_api_only_for_mempool_api_source() {
        let mut config = quiet_config();
        assert!(build_fee_api(&config).expect("none").is_none());
        config.mempool.hist_source = HistogramSource::MempoolApi;
        assert!(build_fee_api(&config).expect("client").is_some());
    }

    #[test]
    fn geo_resolver_unconfigured_without_databases() {
        let config = quiet_config();
        assert!(!build_geo_resolver(&config).is_configured());
    }

    #[tokio::test]
    async fn service_builds_from_defaults() {
        let mut config = quiet_config();
        config.zmq.enabled = true;
        let rpc = Arc::new(build_rpc_client(&config, None).expect("client"));
        let service = build_service(&config, rpc).expect("service");
        service.stop(Duration::from_millis(10)).await;
    }
}
