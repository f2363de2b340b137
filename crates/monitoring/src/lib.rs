//! btc-monitor collection engine
//!
//! Builds time-series points from a Bitcoin Core node and its neighbours
//! (ZMQ notifications, an Electrum indexer, GeoIP databases, the host) and
//! writes them to an InfluxDB v2 compatible store in line protocol.

pub mod error;
pub mod geoip;
pub mod metrics;
pub mod point;
pub mod reorg;
pub mod retry;
pub mod scheduler;
pub mod stream;
pub mod system;
pub mod writer;

pub use error::{CollectorError, CollectorResult};
pub use geoip::{GeoError, GeoLookup, GeoResolver, MaxMindResolver, NullResolver};
pub use metrics::{FeeBucket, GeoFamilies, PeerSummary};
pub use point::Point;
pub use reorg::ReorgTracker;
pub use retry::RetryPolicy;
pub use scheduler::{Collector, CollectorService, CollectorSettings, Cycle};
pub use stream::{
    MessageCallback, StreamError, StreamMonitor, StreamStatusHandle, Subscriber, Subscription,
    TopicStatus, ZmqSubscriber,
};
pub use system::{DiskUsage, ProcessStats, SysinfoProbe, SystemProbe};
pub use writer::{LineProtocolWriter, PointSink, WriteCause, WriteError, WriterOptions};
