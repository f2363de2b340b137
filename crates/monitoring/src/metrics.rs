//! Derived metrics and the points built from node and service responses
//!
//! Everything here is a pure function of its inputs; the scheduler does the
//! fetching and the writing.

use crate::geoip::GeoResolver;
use crate::point::Point;
use crate::stream::TopicStatus;
use crate::system::{DiskUsage, ProcessStats};
use btc_monitor_rpc_client::{BlockchainInfo, IndexerStats, MempoolEntry, MempoolInfo, PeerInfo};
use std::collections::BTreeMap;
use std::net::IpAddr;
use tracing::debug;

/// Width of a fee histogram bucket in sat/vB
pub const FEE_BUCKET_WIDTH: u64 = 5;

/// `max(headers - best, 0)`
pub fn block_lag(headers: u64, best_height: u64) -> u64 {
    headers.saturating_sub(best_height)
}

/// Linear-interpolation percentile; `p` in `[0, 1]`.
///
/// NaN samples are ignored and an empty input yields 0.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    let mut data: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if data.is_empty() {
        return 0.0;
    }
    data.sort_by(f64::total_cmp);

    let last = data.len() - 1;
    let k = last as f64 * p.clamp(0.0, 1.0);
    let f = k.floor() as usize;
    let c = (f + 1).min(last);
    if f == c {
        return data[f];
    }
    data[f] * (c as f64 - k) + data[c] * (k - f as f64)
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PeerSummary {
    pub total: f64,
    pub inbound: f64,
    pub outbound: f64,
    pub ping_avg_ms: f64,
    pub ping_p95_ms: f64,
}

/// Counts peers by direction and summarises ping over peers that report one
pub fn peers_metrics(peers: &[PeerInfo]) -> PeerSummary {
    let total = peers.len();
    let inbound = peers.iter().filter(|peer| peer.inbound).count();
    let pings: Vec<f64> = peers
        .iter()
        .filter_map(|peer| peer.pingtime)
        .filter(|ping| *ping > 0.0)
        .map(|ping| ping * 1000.0)
        .collect();

    let ping_avg_ms = if pings.is_empty() {
        0.0
    } else {
        pings.iter().sum::<f64>() / pings.len() as f64
    };

    PeerSummary {
        total: total as f64,
        inbound: inbound as f64,
        outbound: (total - inbound) as f64,
        ping_avg_ms,
        ping_p95_ms: percentile(&pings, 0.95),
    }
}

/// One histogram bar
#[derive(Debug, Clone, PartialEq)]
pub struct FeeBucket {
    pub bucket: String,
    pub count: f64,
}

/// Converts label/count pairs into buckets, preserving label order
pub fn bucket_mempool_histogram(raw: &BTreeMap<String, u64>) -> Vec<FeeBucket> {
    raw.iter()
        .map(|(label, count)| FeeBucket {
            bucket: label.clone(),
            count: *count as f64,
        })
        .collect()
}

/// Label of the 5 sat/vB bucket holding `rate`, e.g. `"10-15"`
pub fn fee_bucket_label(rate: f64) -> String {
    let lower = if rate.is_finite() && rate > 0.0 {
        (rate / FEE_BUCKET_WIDTH as f64).floor() as u64 * FEE_BUCKET_WIDTH
    } else {
        0
    };
    format!("{lower}-{}", lower + FEE_BUCKET_WIDTH)
}

/// Counts mempool transactions per fee-rate bucket
pub fn core_fee_histogram<'a>(
    entries: impl IntoIterator<Item = &'a MempoolEntry>,
) -> BTreeMap<String, u64> {
    let mut buckets = BTreeMap::new();
    for entry in entries {
        *buckets
            .entry(fee_bucket_label(entry.fee_rate_sat_per_vb()))
            .or_insert(0) += 1;
    }
    buckets
}

/// Recommended-fee values truncated to whole counts
pub fn fee_api_histogram(recommended: &BTreeMap<String, f64>) -> BTreeMap<String, u64> {
    recommended
        .iter()
        .map(|(label, value)| (label.clone(), value.max(0.0).trunc() as u64))
        .collect()
}

pub fn create_blockchain_points(
    network: &str,
    info: &BlockchainInfo,
    reorg_depth: u64,
    streams: &BTreeMap<String, TopicStatus>,
) -> Vec<Point> {
    let best = info.blocks;
    let headers = info.headers_or_best();
    let mut points = vec![Point::new("blockchain")
        .tag("network", network)
        .field("best_height", best as f64)
        .field("headers_height", headers as f64)
        .field("block_lag", block_lag(headers, best) as f64)
        .field("verification_progress", info.verificationprogress)
        .field("difficulty", info.difficulty)
        .field("max_reorg_depth", reorg_depth as f64)];

    points.extend(streams.iter().map(|(topic, status)| {
        Point::new("zmq")
            .tag("network", network)
            .tag("stream", topic.as_str())
            .field("seconds_since", status.seconds_since_last_message)
            .field("messages", status.message_count as f64)
    }));
    points
}

pub fn create_mempool_points(
    network: &str,
    info: &MempoolInfo,
    fee_fast: f64,
    fee_slow: f64,
) -> Vec<Point> {
    vec![Point::new("mempool")
        .tag("network", network)
        .field("tx_count", info.size as f64)
        .field("vsize_mb", info.bytes as f64 / 1_000_000.0)
        .field("fee_fast", fee_fast)
        .field("fee_slow", fee_slow)]
}

/// One point per bucket, the bucket label being the field name
pub fn create_histogram_points(network: &str, buckets: &[FeeBucket]) -> Vec<Point> {
    buckets
        .iter()
        .map(|entry| {
            Point::new("mempool_hist")
                .tag("network", network)
                .field(entry.bucket.as_str(), entry.count)
        })
        .collect()
}

pub fn create_peer_points(network: &str, summary: &PeerSummary) -> Vec<Point> {
    vec![Point::new("peers")
        .tag("network", network)
        .field("total", summary.total)
        .field("inbound", summary.inbound)
        .field("outbound", summary.outbound)
        .field("ping_avg_ms", summary.ping_avg_ms)
        .field("ping_p95_ms", summary.ping_p95_ms)]
}

pub fn create_process_point(name: &str, stats: &ProcessStats) -> Point {
    Point::new("process")
        .tag("name", name)
        .field("cpu_percent", stats.cpu_percent)
        .field("memory_rss_mb", stats.memory_rss_mb)
        .field("open_files", stats.open_files)
}

pub fn create_filesystem_point(path: &str, usage: &DiskUsage) -> Point {
    Point::new("filesystem")
        .tag("path", path)
        .field("chainstate_gb", usage.used_gb)
        .field("free_percent", usage.free_percent)
}

pub fn create_indexer_point(stats: &IndexerStats) -> Point {
    Point::new("fulcrum")
        .field("tip_height", stats.tip_height)
        .field("clients", stats.clients)
}

/// Bare IP of a peer address: `[v6]:port`, `v4:port` or a plain literal.
///
/// Onion, I2P and other non-IP addresses yield `None`.
pub fn extract_ip(addr: &str) -> Option<IpAddr> {
    let address = addr.trim();
    if address.is_empty() {
        return None;
    }
    let host = match address.strip_prefix('[') {
        Some(rest) => rest.split(']').next().unwrap_or(rest),
        None => match address.parse::<IpAddr>() {
            Ok(ip) => return Some(ip),
            Err(_) => address.rsplit_once(':').map_or(address, |(host, _)| host),
        },
    };
    host.parse().ok()
}

/// Which geo families to emit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeoFamilies {
    pub country: bool,
    pub asn: bool,
}

/// Peer counts per (direction, country) and (direction, ASN).
///
/// Returns nothing when the resolver is unconfigured. A peer whose address
/// is not an IP literal or whose lookup fails is left out.
pub fn create_peer_geo_points(
    network: &str,
    peers: &[PeerInfo],
    resolver: &dyn GeoResolver,
    families: GeoFamilies,
) -> Vec<Point> {
    if !resolver.is_configured() || !(families.country || families.asn) {
        return Vec::new();
    }

    let mut countries: BTreeMap<(&'static str, String), u64> = BTreeMap::new();
    let mut asns: BTreeMap<(&'static str, String), u64> = BTreeMap::new();

    for peer in peers {
        let Some(ip) = extract_ip(&peer.addr) else {
            continue;
        };
        let lookup = match resolver.lookup(ip) {
            Ok(lookup) => lookup,
            Err(err) => {
                debug!(error = %err, "peer excluded from geo stats");
                continue;
            }
        };
        let direction = if peer.inbound { "inbound" } else { "outbound" };
        if let Some(country) = lookup.country.filter(|_| families.country) {
            *countries.entry((direction, country)).or_insert(0) += 1;
        }
        if let Some(asn) = lookup.asn.filter(|_| families.asn) {
            *asns.entry((direction, asn)).or_insert(0) += 1;
        }
    }

    let geo_point = |measurement: &str, key: &str, direction: &str, value: String, count: u64| {
        Point::new(measurement)
            .tag("network", network)
            .tag("direction", direction)
            .tag(key, value)
            .field("peer_count", count as f64)
    };

    countries
        .into_iter()
        .map(|((direction, country), count)| {
            geo_point("peers_geo", "country", direction, country, count)
        })
        .chain(
            asns.into_iter()
                .map(|((direction, asn), count)| geo_point("peers_asn", "asn", direction, asn, count)),
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use btc_monitor_rpc_client::MempoolFees;

    #[test]
    fn lag_never_negative() {
        assert_eq!(block_lag(105, 100), 5);
        assert_eq!(block_lag(100, 105), 0);
    }

    #[test]
    fn percentile_interpolates() {
        let values = [10.0, 20.0, 30.0, 40.0, 50.0];
        assert!((percentile(&values, 0.95) - 48.0).abs() < 1e-9);
        assert_eq!(percentile(&values, 0.5), 30.0);
        assert_eq!(percentile(&values, 1.0), 50.0);
        assert_eq!(percentile(&[], 0.95), 0.0);
        assert_eq!(percentile(&[7.0], 0.95), 7.0);
    }

    #[test]
    fn percentile_sorts_and_skips_nan() {
        assert_eq!(percentile(&[50.0, f64::NAN, 10.0], 0.0), 10.0);
    }

    #[test]
    fn fee_bucket_labels() {
        assert_eq!(fee_bucket_label(0.0), "0-5");
        assert_eq!(fee_bucket_label(4.99), "0-5");
        assert_eq!(fee_bucket_label(5.0), "5-10");
        assert_eq!(fee_bucket_label(12.3), "10-15");
    }

    #[test]
    fn core_histogram_counts_per_bucket() {
        let entry = |base: f64, vsize: Option<u64>| MempoolEntry {
            vsize,
            fees: MempoolFees {
                base,
                modified: base,
            },
            ..Default::default()
        };
        let entries = vec![
            entry(0.00000200, Some(100)),
            entry(0.00000300, Some(100)),
            entry(0.00001200, Some(100)),
            entry(0.00000001, None),
        ];
        let hist = core_fee_histogram(&entries);
        assert_eq!(hist.get("0-5"), Some(&3));
        assert_eq!(hist.get("10-15"), Some(&1));
    }

    #[test]
    fn fee_api_values_are_truncated() {
        let mut raw = BTreeMap::new();
        raw.insert("fastestFee".to_string(), 21.9);
        raw.insert("minimumFee".to_string(), 1.0);
        let hist = fee_api_histogram(&raw);
        assert_eq!(hist["fastestFee"], 21);
        assert_eq!(hist["minimumFee"], 1);
    }

    #[test]
    fn extract_ip_forms() {
        assert_eq!(extract_ip("203.0.113.1:8333"), "203.0.113.1".parse().ok());
        assert_eq!(extract_ip("[2001:db8::1]:8333"), "2001:db8::1".parse().ok());
        assert_eq!(extract_ip("2001:db8::2"), "2001:db8::2".parse().ok());
        assert_eq!(extract_ip("invalid"), None);
        assert_eq!(extract_ip("abcdefghijklmnop.onion:8333"), None);
        assert_eq!(extract_ip("  "), None);
    }

    #[test]
    fn blockchain_points_include_stream_liveness() {
        let info = BlockchainInfo {
            blocks: 100,
            headers: Some(103),
            verificationprogress: 0.5,
            difficulty: 2.0,
            ..Default::default()
        };
        let mut streams = BTreeMap::new();
        streams.insert(
            "rawblock".to_string(),
            TopicStatus {
                endpoint: "tcp://127.0.0.1:28332".to_string(),
                seconds_since_last_message: 4.0,
                message_count: 9,
            },
        );
        let points = create_blockchain_points("mainnet", &info, 2, &streams);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].get_field("block_lag"), Some(3.0));
        assert_eq!(points[0].get_field("max_reorg_depth"), Some(2.0));
        assert_eq!(points[1].measurement(), "zmq");
        assert_eq!(points[1].get_tag("stream"), Some("rawblock"));
        assert_eq!(points[1].get_field("messages"), Some(9.0));
    }

    #[test]
    fn missing_headers_fall_back_to_best_height() {
        let info = BlockchainInfo {
            blocks: 100,
            headers: None,
            ..Default::default()
        };
        let points = create_blockchain_points("mainnet", &info, 0, &BTreeMap::new());
        assert_eq!(points[0].get_field("headers_height"), Some(100.0));
        assert_eq!(points[0].get_field("block_lag"), Some(0.0));
    }

    #[test]
    fn mempool_point_converts_bytes_to_mb() {
        let info = MempoolInfo {
            size: 1500,
            bytes: 2_500_000,
            ..Default::default()
        };
        let point = &create_mempool_points("testnet", &info, 12.0, 0.0)[0];
        assert_eq!(point.get_field("vsize_mb"), Some(2.5));
        assert_eq!(point.get_field("fee_slow"), Some(0.0));
        assert_eq!(point.get_tag("network"), Some("testnet"));
    }

    #[test]
    fn histogram_points_use_label_as_field() {
        let points = create_histogram_points(
            "mainnet",
            &[FeeBucket {
                bucket: "0-5".to_string(),
                count: 10.0,
            }],
        );
        assert_eq!(points[0].to_line(), "mempool_hist,network=mainnet 0-5=10");
    }
}
