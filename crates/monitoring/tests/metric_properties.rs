//! Behavioural properties of the derived metrics and the line protocol

use btc_monitor_rpc_client::PeerInfo;
use btc_monitoring::geoip::{GeoError, GeoLookup, GeoResolver};
use btc_monitoring::metrics::{
    bucket_mempool_histogram, create_peer_geo_points, peers_metrics, percentile, GeoFamilies,
};
use btc_monitoring::{Point, ReorgTracker};
use std::collections::BTreeMap;
use std::net::IpAddr;

fn peer(addr: &str, inbound: bool, pingtime: Option<f64>) -> PeerInfo {
    PeerInfo {
        addr: addr.to_string(),
        inbound,
        pingtime,
        ..Default::default()
    }
}

/// Reference computation over an explicit window
fn expected_depth(window: &[u64]) -> u64 {
    window
        .windows(2)
        .filter(|pair| pair[1] < pair[0])
        .map(|pair| pair[0] - pair[1])
        .max()
        .unwrap_or(0)
}

#[test]
fn reorg_depth_matches_largest_drop_in_window() {
    let mut tracker = ReorgTracker::new(5);
    for height in [100, 101, 102, 99, 100] {
        tracker.update(height);
    }
    assert_eq!(tracker.max_reorg_depth(), 3);
}

#[test]
fn reorg_depth_agrees_with_reference_for_many_sequences() {
    let sequences: Vec<Vec<u64>> = vec![
        vec![],
        vec![5],
        vec![1, 2, 3, 4, 5, 6, 7, 8],
        vec![10, 9, 8, 7, 6],
        vec![200, 190, 205, 204, 210, 150, 151, 152, 153, 154, 155, 156],
        (0..40).map(|i| if i % 7 == 0 { 1000 - i } else { 1000 + i }).collect(),
    ];

    for max_depth in [1_usize, 2, 3, 5, 10] {
        for heights in &sequences {
            let mut tracker = ReorgTracker::new(max_depth);
            heights.iter().for_each(|h| tracker.update(*h));

            let keep = heights.len().saturating_sub(max_depth * 2);
            let window = &heights[keep..];
            assert_eq!(
                tracker.max_reorg_depth(),
                expected_depth(window),
                "max_depth={max_depth} heights={heights:?}"
            );
        }
    }
}

#[test]
fn p95_lies_between_the_two_highest_values() {
    let p95 = percentile(&[10.0, 20.0, 30.0, 40.0, 50.0], 0.95);
    assert!(p95 >= 40.0 && p95 <= 50.0);
}

#[test]
fn histogram_keeps_label_and_count() {
    let mut raw = BTreeMap::new();
    raw.insert("0-5".to_string(), 10);
    raw.insert("5-10".to_string(), 2);

    let buckets = bucket_mempool_histogram(&raw);
    let first = buckets
        .iter()
        .find(|bucket| bucket.bucket == "0-5")
        .expect("0-5 bucket");
    assert_eq!(first.count, 10.0);
    assert_eq!(buckets.len(), 2);
}

#[test]
fn peer_summary_counts_and_orders_pings() {
    let peers = vec![
        peer("1.1.1.1:8333", true, Some(0.1)),
        peer("2.2.2.2:8333", false, Some(0.2)),
        peer("3.3.3.3:8333", false, Some(0.3)),
    ];
    let summary = peers_metrics(&peers);
    assert_eq!(summary.total, 3.0);
    assert_eq!(summary.inbound, 1.0);
    assert_eq!(summary.outbound, 2.0);
    assert!(summary.ping_p95_ms >= summary.ping_avg_ms);
    assert!((summary.ping_avg_ms - 200.0).abs() < 1e-9);
}

#[test]
fn peers_without_ping_are_left_out_of_latency() {
    let peers = vec![peer("1.1.1.1:8333", true, None), peer("2.2.2.2:8333", false, Some(0.05))];
    let summary = peers_metrics(&peers);
    assert_eq!(summary.total, 2.0);
    assert!((summary.ping_avg_ms - 50.0).abs() < 1e-9);
    assert_eq!(peers_metrics(&[]).ping_p95_ms, 0.0);
}

#[test]
fn line_protocol_escaping_example() {
    let point = Point::new("peer stats")
        .tag("asn", "AS64500 Example")
        .tag("path", "/var/lib/bitcoin,mainnet")
        .field("latency ms", 1.23)
        .field("peers", 8.0);
    assert_eq!(
        point.to_line(),
        r"peer\ stats,asn=AS64500\ Example,path=/var/lib/bitcoin\,mainnet latency\ ms=1.23,peers=8"
    );
}

struct TableResolver;

impl GeoResolver for TableResolver {
    fn lookup(&self, ip: IpAddr) -> Result<GeoLookup, GeoError> {
        match ip.to_string().as_str() {
            "203.0.113.1" => Ok(GeoLookup {
                country: Some("US".to_string()),
                asn: Some("AS64500 Example".to_string()),
            }),
            "198.51.100.5" => Ok(GeoLookup {
                country: Some("CA".to_string()),
                asn: None,
            }),
            "192.0.2.66" => Err(GeoError {
                ip,
                message: "corrupt record".to_string(),
            }),
            _ => Ok(GeoLookup::default()),
        }
    }

    fn is_configured(&self) -> bool {
        true
    }
}

fn count_of(points: &[Point], measurement: &str, key: &str, direction: &str, value: &str) -> f64 {
    points
        .iter()
        .find(|p| {
            p.measurement() == measurement
                && p.get_tag("direction") == Some(direction)
                && p.get_tag(key) == Some(value)
        })
        .and_then(|p| p.get_field("peer_count"))
        .unwrap_or(0.0)
}

#[test]
fn geo_points_count_by_direction() {
    let peers = vec![
        peer("203.0.113.1:8333", true, None),
        peer("203.0.113.1:18333", false, None),
        peer("198.51.100.5:8333", false, None),
        peer("192.0.2.66:8333", false, None),
        peer("exampleonionaddress.onion:8333", true, None),
    ];
    let families = GeoFamilies {
        country: true,
        asn: true,
    };

    let points = create_peer_geo_points("mainnet", &peers, &TableResolver, families);

    assert_eq!(count_of(&points, "peers_geo", "country", "inbound", "US"), 1.0);
    assert_eq!(count_of(&points, "peers_geo", "country", "outbound", "US"), 1.0);
    assert_eq!(count_of(&points, "peers_geo", "country", "outbound", "CA"), 1.0);
    assert_eq!(count_of(&points, "peers_asn", "asn", "inbound", "AS64500 Example"), 1.0);
    assert_eq!(count_of(&points, "peers_asn", "asn", "outbound", "AS64500 Example"), 1.0);
    assert_eq!(points.len(), 5);
    assert!(points.iter().all(|p| p.get_tag("network") == Some("mainnet")));
}

#[test]
fn geo_families_can_be_disabled_independently() {
    let peers = vec![peer("203.0.113.1:8333", true, None)];

    let asn_only = create_peer_geo_points(
        "mainnet",
        &peers,
        &TableResolver,
        GeoFamilies {
            country: false,
            asn: true,
        },
    );
    assert!(asn_only.iter().all(|p| p.measurement() == "peers_asn"));
    assert_eq!(asn_only.len(), 1);

    let none = create_peer_geo_points(
        "mainnet",
        &peers,
        &TableResolver,
        GeoFamilies {
            country: false,
            asn: false,
        },
    );
    assert!(none.is_empty());
}

#[test]
fn unconfigured_resolver_emits_nothing() {
    let peers = vec![peer("203.0.113.1:8333", true, None)];
    let points = create_peer_geo_points(
        "mainnet",
        &peers,
        &btc_monitoring::NullResolver,
        GeoFamilies {
            country: true,
            asn: true,
        },
    );
    assert!(points.is_empty());
}
