//! Fast and slow collection cycles and the loops that drive them

use crate::error::{CollectorError, CollectorResult};
use crate::geoip::{GeoResolver, NullResolver};
use crate::metrics::{
    bucket_mempool_histogram, core_fee_histogram, create_blockchain_points,
    create_filesystem_point, create_histogram_points, create_indexer_point,
    create_mempool_points, create_peer_geo_points, create_peer_points, create_process_point,
    fee_api_histogram, peers_metrics, GeoFamilies,
};
use crate::point::Point;
use crate::reorg::ReorgTracker;
use crate::retry::RetryPolicy;
use crate::stream::{StreamMonitor, StreamStatusHandle};
use crate::system::SystemProbe;
use crate::writer::PointSink;
use btc_monitor_config::{CollectorConfig, FeatureFlags, HistogramSource};
use btc_monitor_rpc_client::{FeeApiClient, IndexerClient, NodeRpc};
use parking_lot::Mutex;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Confirmation targets for the fast and slow fee estimates
pub const FEE_TARGET_FAST: u32 = 3;
pub const FEE_TARGET_SLOW: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
    Fast,
    Slow,
}

impl Cycle {
    pub fn name(self) -> &'static str {
        match self {
            Cycle::Fast => "collect_fast",
            Cycle::Slow => "collect_slow",
        }
    }
}

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The slice of configuration the cycles read
#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub network: String,
    pub process_name: String,
    pub chainstate_dir: Option<PathBuf>,
    pub features: FeatureFlags,
    pub hist_source: HistogramSource,
}

impl CollectorSettings {
    pub fn from_config(config: &CollectorConfig) -> Self {
        Self {
            network: config.bitcoin.network.clone(),
            process_name: config.bitcoin.process_name.clone(),
            chainstate_dir: config.bitcoin.chainstate_dir.clone(),
            features: config.features.clone(),
            hist_source: config.mempool.hist_source,
        }
    }
}

/// Fetches node and service data, builds points and writes each cycle as one batch
pub struct Collector {
    settings: CollectorSettings,
    rpc: Arc<dyn NodeRpc>,
    sink: Arc<dyn PointSink>,
    indexer: Option<IndexerClient>,
    fee_api: Option<FeeApiClient>,
    geo: Arc<dyn GeoResolver>,
    system: Option<Arc<dyn SystemProbe>>,
    streams: StreamStatusHandle,
    reorg: Mutex<ReorgTracker>,
    retry: RetryPolicy,
}

impl Collector {
    pub fn new(settings: CollectorSettings, rpc: Arc<dyn NodeRpc>, sink: Arc<dyn PointSink>) -> Self {
        Self {
            settings,
            rpc,
            sink,
            indexer: None,
            fee_api: None,
            geo: Arc::new(NullResolver),
            system: None,
            streams: StreamStatusHandle::default(),
            reorg: Mutex::new(ReorgTracker::default()),
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_indexer(mut self, indexer: Option<IndexerClient>) -> Self {
        self.indexer = indexer;
        self
    }

    #[must_use]
    pub fn with_fee_api(mut self, fee_api: Option<FeeApiClient>) -> Self {
        self.fee_api = fee_api;
        self
    }

    #[must_use]
    pub fn with_geo_resolver(mut self, geo: Arc<dyn GeoResolver>) -> Self {
        self.geo = geo;
        self
    }

    #[must_use]
    pub fn with_system_probe(mut self, probe: Arc<dyn SystemProbe>) -> Self {
        self.system = Some(probe);
        self
    }

    #[must_use]
    pub fn with_streams(mut self, streams: StreamStatusHandle) -> Self {
        self.streams = streams;
        self
    }

    #[must_use]
    pub fn with_reorg_tracker(mut self, tracker: ReorgTracker) -> Self {
        self.reorg = Mutex::new(tracker);
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn settings(&self) -> &CollectorSettings {
        &self.settings
    }

    /// Runs one cycle on its own task with bounded retry.
    ///
    /// A panic inside the cycle surfaces as [`CollectorError::Join`].
    pub async fn run_cycle(self: &Arc<Self>, cycle: Cycle) -> CollectorResult<usize> {
        self.retry
            .run(cycle.name(), || {
                let collector = Arc::clone(self);
                async move {
                    match tokio::spawn(async move { collector.collect(cycle).await }).await {
                        Ok(result) => result,
                        Err(join) => Err(CollectorError::Join(join)),
                    }
                }
            })
            .await
    }

    pub async fn collect(&self, cycle: Cycle) -> CollectorResult<usize> {
        match cycle {
            Cycle::Fast => self.collect_fast().await,
            Cycle::Slow => self.collect_slow().await,
        }
    }

    /// Chain tip, stream liveness, mempool, fee estimates and the optional histogram
    pub async fn collect_fast(&self) -> CollectorResult<usize> {
        debug!("collecting fast metrics");
        let network = self.settings.network.as_str();

        let info = self.rpc.get_blockchain_info().await?;
        let reorg_depth = {
            let mut tracker = self.reorg.lock();
            tracker.update(info.blocks);
            tracker.max_reorg_depth()
        };
        let mut points =
            create_blockchain_points(network, &info, reorg_depth, &self.streams.snapshot());

        let mempool = self.rpc.get_mempool_info().await?;
        let fee_fast = self.estimate_fee(FEE_TARGET_FAST).await;
        let fee_slow = self.estimate_fee(FEE_TARGET_SLOW).await;
        points.extend(create_mempool_points(network, &mempool, fee_fast, fee_slow));

        points.extend(self.mempool_histogram().await?);

        Ok(self.sink.write_points(points).await?)
    }

    /// Peers, process, filesystem, indexer and peer geography
    pub async fn collect_slow(&self) -> CollectorResult<usize> {
        debug!("collecting slow metrics");
        let network = self.settings.network.as_str();
        let features = &self.settings.features;
        let geo_families = GeoFamilies {
            country: features.peer_geo,
            asn: features.asn_stats,
        };
        let wants_geo = self.geo.is_configured() && (geo_families.country || geo_families.asn);

        let peers = if features.peer_quality || wants_geo {
            self.rpc.get_peer_info().await?
        } else {
            Vec::new()
        };

        let mut points: Vec<Point> = Vec::new();
        if features.peer_quality {
            points.extend(create_peer_points(network, &peers_metrics(&peers)));
        }

        if let Some(probe) = &self.system {
            points.extend(self.host_points(probe.clone()).await?);
        }

        if let Some(indexer) = &self.indexer {
            match indexer.fetch().await {
                Ok(stats) => points.push(create_indexer_point(&stats)),
                Err(err) => debug!(error = %err, "indexer stats unavailable"),
            }
        }

        if wants_geo {
            points.extend(create_peer_geo_points(
                network,
                &peers,
                self.geo.as_ref(),
                geo_families,
            ));
        }

        Ok(self.sink.write_points(points).await?)
    }

    async fn estimate_fee(&self, blocks: u32) -> f64 {
        match self.rpc.estimate_smart_fee(blocks).await {
            Ok(estimate) => estimate.sat_per_vbyte(),
            Err(err) => {
                debug!(blocks, error = %err, "fee estimate unavailable");
                0.0
            }
        }
    }

    async fn mempool_histogram(&self) -> CollectorResult<Vec<Point>> {
        let counts = match self.settings.hist_source {
            HistogramSource::None => return Ok(Vec::new()),
            HistogramSource::CoreRawmempool => {
                let raw = self.rpc.get_raw_mempool_verbose().await?;
                core_fee_histogram(raw.values())
            }
            HistogramSource::MempoolApi => {
                let Some(fee_api) = &self.fee_api else {
                    return Ok(Vec::new());
                };
                match fee_api.fetch_recommended().await {
                    Ok(recommended) => fee_api_histogram(&recommended),
                    Err(err) => {
                        debug!(error = %err, "fee api unavailable");
                        return Ok(Vec::new());
                    }
                }
            }
        };
        let buckets = bucket_mempool_histogram(&counts);
        Ok(create_histogram_points(&self.settings.network, &buckets))
    }

    /// Process and disk points; sysinfo calls block, so they run off the runtime
    async fn host_points(&self, probe: Arc<dyn SystemProbe>) -> CollectorResult<Vec<Point>> {
        let features = self.settings.features.clone();
        let process_name = self.settings.process_name.clone();
        let chainstate_dir = self.settings.chainstate_dir.clone();

        let points = tokio::task::spawn_blocking(move || {
            let mut points = Vec::new();
            if features.process_metrics {
                match probe.process(&process_name) {
                    Some(stats) => points.push(create_process_point(&process_name, &stats)),
                    None => debug!(process = %process_name, "process not found"),
                }
            }
            if features.disk_io {
                let usage = chainstate_dir
                    .as_ref()
                    .and_then(|dir| probe.disk_usage(dir).map(|usage| (dir, usage)));
                match usage {
                    Some((dir, usage)) => points.push(create_filesystem_point(
                        &dir.display().to_string(),
                        &usage,
                    )),
                    None => debug!(path = ?chainstate_dir, "chainstate dir unavailable"),
                }
            }
            points
        })
        .await?;
        Ok(points)
    }
}

/// Runs the fast and slow cadence loops and owns the stream monitor
pub struct CollectorService {
    collector: Arc<Collector>,
    streams: Option<Arc<StreamMonitor>>,
    fast_interval: Duration,
    slow_interval: Duration,
    cancel: CancellationToken,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl CollectorService {
    pub fn new(collector: Arc<Collector>, fast_interval: Duration, slow_interval: Duration) -> Self {
        Self {
            collector,
            streams: None,
            fast_interval,
            slow_interval,
            cancel: CancellationToken::new(),
            loops: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_stream_monitor(mut self, monitor: Arc<StreamMonitor>) -> Self {
        self.streams = Some(monitor);
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Starts the stream listeners and both cadence loops
    pub fn start(&self) {
        let mut loops = self.loops.lock();
        if !loops.is_empty() {
            return;
        }
        if let Some(monitor) = &self.streams {
            monitor.start();
        }
        for (cycle, interval) in [
            (Cycle::Fast, self.fast_interval),
            (Cycle::Slow, self.slow_interval),
        ] {
            loops.push(tokio::spawn(cadence_loop(
                Arc::clone(&self.collector),
                cycle,
                interval,
                self.cancel.child_token(),
            )));
        }
        info!(
            fast_secs = self.fast_interval.as_secs(),
            slow_secs = self.slow_interval.as_secs(),
            "collector started"
        );
    }

    /// Cancels everything, joining listeners and loops within `join_timeout`
    pub async fn stop(&self, join_timeout: Duration) {
        self.cancel.cancel();
        if let Some(monitor) = &self.streams {
            monitor.stop(join_timeout).await;
        }
        let loops: Vec<_> = std::mem::take(&mut *self.loops.lock());
        for mut handle in loops {
            if timeout(join_timeout, &mut handle).await.is_err() {
                warn!("cadence loop still busy, aborting");
                handle.abort();
            }
        }
        info!("collector stopped");
    }
}

async fn cadence_loop(
    collector: Arc<Collector>,
    cycle: Cycle,
    interval: Duration,
    cancel: CancellationToken,
) {
    while !cancel.is_cancelled() {
        let started = Instant::now();
        match collector.run_cycle(cycle).await {
            Ok(written) => debug!(%cycle, points = written, "cycle complete"),
            Err(err) => error!(%cycle, error = %err, "collection cycle failed"),
        }
        let sleep_for = interval.saturating_sub(started.elapsed());
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(sleep_for) => {}
        }
    }
}
