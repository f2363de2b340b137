//! # btc-monitor: metrics collection for a Bitcoin full node
//!
//! Polls Bitcoin Core over JSON-RPC on a fast and a slow cadence, tracks the
//! liveness of its ZMQ notification streams and writes the derived
//! measurements to an InfluxDB v2 compatible store.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use btc_monitor::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CollectorConfig::default();
//!     let rpc = RpcClient::builder(Url::parse(&config.rpc_url())?).build()?;
//!     let writer = LineProtocolWriter::new(WriterOptions::from_config(
//!         &config.influx,
//!         config.influx_token(),
//!     ))?;
//!
//!     let collector = Arc::new(Collector::new(
//!         CollectorSettings::from_config(&config),
//!         Arc::new(rpc),
//!         Arc::new(writer),
//!     ));
//!     let written = collector.run_cycle(Cycle::Fast).await?;
//!     println!("wrote {written} points");
//!
//!     let service = CollectorService::new(collector, Duration::from_secs(5), Duration::from_secs(30));
//!     service.start();
//!     tokio::signal::ctrl_c().await?;
//!     service.stop(Duration::from_secs(2)).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`config`] - configuration, environment overrides and credential discovery
//! - [`rpc`] - JSON-RPC client for the node plus the indexer and fee API clients
//! - [`monitoring`] - metric derivation, line protocol writer, stream monitor and scheduler

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub use btc_monitor_config as config;
pub use btc_monitor_rpc_client as rpc;
pub use btc_monitoring as monitoring;

/// Common imports for embedding the collector
pub mod prelude {
    pub use crate::config::{CollectorConfig, FeatureFlags, HistogramSource};
    pub use crate::monitoring::{
        Collector, CollectorError, CollectorService, CollectorSettings, Cycle,
        LineProtocolWriter, Point, PointSink, StreamMonitor, WriterOptions, ZmqSubscriber,
    };
    pub use crate::rpc::{NodeRpc, RpcClient, RpcError, Url};
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
