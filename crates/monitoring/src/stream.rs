//! Liveness tracking for the node's ZMQ notification topics
//!
//! One task per topic subscribes to its endpoint and records the arrival
//! time and count of every message. The scheduler reads a snapshot of those
//! counters through [`StreamStatusHandle`] from another task.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zeromq::{Socket, SocketRecv, SubSocket};

/// Upper bound on how long a listener blocks before checking for shutdown
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Pause between connection attempts to an unreachable endpoint
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("failed to connect to {endpoint}: {message}")]
    Connect { endpoint: String, message: String },

    #[error("failed to subscribe to {topic}: {message}")]
    Subscribe { topic: String, message: String },

    #[error("receive failed: {0}")]
    Receive(String),
}

/// An open subscription delivering raw message frames
#[async_trait]
pub trait Subscription: Send {
    async fn recv(&mut self) -> Result<Vec<u8>, StreamError>;

    /// Releases the socket without flushing pending messages
    async fn close(self: Box<Self>);
}

/// Opens subscriptions; the production implementation is [`ZmqSubscriber`]
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn subscribe(
        &self,
        endpoint: &str,
        topic: &str,
    ) -> Result<Box<dyn Subscription>, StreamError>;
}

/// SUB sockets from the pure-Rust `zeromq` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct ZmqSubscriber;

struct ZmqSubscription {
    socket: SubSocket,
}

#[async_trait]
impl Subscription for ZmqSubscription {
    async fn recv(&mut self) -> Result<Vec<u8>, StreamError> {
        let message = self
            .socket
            .recv()
            .await
            .map_err(|err| StreamError::Receive(err.to_string()))?;
        // frames: topic, body, sequence number
        let body = message.get(1).or_else(|| message.get(0));
        Ok(body.map(|frame| frame.to_vec()).unwrap_or_default())
    }

    async fn close(self: Box<Self>) {
        let errors = self.socket.close().await;
        if !errors.is_empty() {
            debug!(count = errors.len(), "errors while closing zmq socket");
        }
    }
}

#[async_trait]
impl Subscriber for ZmqSubscriber {
    async fn subscribe(
        &self,
        endpoint: &str,
        topic: &str,
    ) -> Result<Box<dyn Subscription>, StreamError> {
        let mut socket = SubSocket::new();
        socket
            .connect(endpoint)
            .await
            .map_err(|err| StreamError::Connect {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            })?;
        socket
            .subscribe(topic)
            .await
            .map_err(|err| StreamError::Subscribe {
                topic: topic.to_string(),
                message: err.to_string(),
            })?;
        Ok(Box::new(ZmqSubscription { socket }))
    }
}

#[derive(Debug)]
struct TopicState {
    endpoint: String,
    last_seen: Instant,
    messages: u64,
}

/// Point-in-time view of one topic
#[derive(Debug, Clone, PartialEq)]
pub struct TopicStatus {
    pub endpoint: String,
    pub seconds_since_last_message: f64,
    pub message_count: u64,
}

/// Shared, cloneable access to the per-topic counters.
///
/// The topic set is fixed at construction; each entry has its own lock so
/// listeners never contend with each other.
#[derive(Debug, Clone, Default)]
pub struct StreamStatusHandle {
    topics: Arc<BTreeMap<String, Arc<Mutex<TopicState>>>>,
}

impl StreamStatusHandle {
    fn new(topics: &[(String, String)]) -> Self {
        let now = Instant::now();
        let map = topics
            .iter()
            .map(|(topic, endpoint)| {
                let state = TopicState {
                    endpoint: endpoint.clone(),
                    last_seen: now,
                    messages: 0,
                };
                (topic.clone(), Arc::new(Mutex::new(state)))
            })
            .collect();
        Self {
            topics: Arc::new(map),
        }
    }

    fn record(&self, topic: &str) {
        if let Some(state) = self.topics.get(topic) {
            let mut state = state.lock();
            state.last_seen = Instant::now();
            state.messages += 1;
        }
    }

    /// Seconds since the last message and message count for every topic
    pub fn snapshot(&self) -> BTreeMap<String, TopicStatus> {
        let now = Instant::now();
        self.topics
            .iter()
            .map(|(topic, state)| {
                let state = state.lock();
                let status = TopicStatus {
                    endpoint: state.endpoint.clone(),
                    seconds_since_last_message: now
                        .saturating_duration_since(state.last_seen)
                        .as_secs_f64(),
                    message_count: state.messages,
                };
                (topic.clone(), status)
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

/// Invoked with `(topic, payload)` for every received message
pub type MessageCallback = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

/// Runs one listener task per topic and exposes their liveness
pub struct StreamMonitor {
    topics: Vec<(String, String)>,
    subscriber: Arc<dyn Subscriber>,
    status: StreamStatusHandle,
    callback: Option<MessageCallback>,
    poll_timeout: Duration,
    reconnect_delay: Duration,
    cancel: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl StreamMonitor {
    /// `topics` are `(topic, endpoint)` pairs
    pub fn new(topics: Vec<(String, String)>, subscriber: Arc<dyn Subscriber>) -> Self {
        let status = StreamStatusHandle::new(&topics);
        Self {
            topics,
            subscriber,
            status,
            callback: None,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            cancel: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_callback(mut self, callback: MessageCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    #[must_use]
    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Spawns the listener tasks; calling it again while running is a no-op
    pub fn start(&self) {
        let mut handles = self.handles.lock();
        if !handles.is_empty() || self.cancel.is_cancelled() {
            return;
        }
        for (topic, endpoint) in &self.topics {
            let listener = Listener {
                topic: topic.clone(),
                endpoint: endpoint.clone(),
                subscriber: self.subscriber.clone(),
                status: self.status.clone(),
                callback: self.callback.clone(),
                poll_timeout: self.poll_timeout,
                reconnect_delay: self.reconnect_delay,
                cancel: self.cancel.child_token(),
            };
            handles.push(tokio::spawn(listener.run()));
        }
        info!(topics = self.topics.len(), "stream listeners started");
    }

    pub fn status(&self) -> BTreeMap<String, TopicStatus> {
        self.status.snapshot()
    }

    pub fn status_handle(&self) -> StreamStatusHandle {
        self.status.clone()
    }

    /// Signals every listener and waits up to `join_timeout` for them.
    ///
    /// Returns `false` if some listener had to be aborted.
    pub async fn stop(&self, join_timeout: Duration) -> bool {
        self.cancel.cancel();
        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock());
        let deadline = Instant::now() + join_timeout;
        let mut clean = true;
        for mut handle in handles {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if timeout(remaining, &mut handle).await.is_err() {
                handle.abort();
                clean = false;
            }
        }
        if !clean {
            warn!("stream listeners did not stop in time, aborted");
        }
        clean
    }
}

impl Drop for StreamMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Listener {
    topic: String,
    endpoint: String,
    subscriber: Arc<dyn Subscriber>,
    status: StreamStatusHandle,
    callback: Option<MessageCallback>,
    poll_timeout: Duration,
    reconnect_delay: Duration,
    cancel: CancellationToken,
}

impl Listener {
    async fn run(self) {
        while !self.cancel.is_cancelled() {
            let subscription = tokio::select! {
                _ = self.cancel.cancelled() => return,
                result = self.subscriber.subscribe(&self.endpoint, &self.topic) => result,
            };
            match subscription {
                Ok(subscription) => {
                    debug!(topic = %self.topic, endpoint = %self.endpoint, "subscribed");
                    if let Err(err) = self.receive(subscription).await {
                        warn!(topic = %self.topic, error = %err, "stream receive failed, reconnecting");
                        self.backoff().await;
                    }
                }
                Err(err) => {
                    warn!(topic = %self.topic, error = %err, "stream connect failed");
                    self.backoff().await;
                }
            }
        }
    }

    /// Waits `reconnect_delay` unless stopped first
    async fn backoff(&self) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = sleep(self.reconnect_delay) => {}
        }
    }

    /// Receives until stopped (`Ok`) or until the subscription fails
    async fn receive(&self, mut subscription: Box<dyn Subscription>) -> Result<(), StreamError> {
        let outcome = loop {
            let received = tokio::select! {
                _ = self.cancel.cancelled() => break Ok(()),
                received = timeout(self.poll_timeout, subscription.recv()) => received,
            };
            match received {
                Err(_elapsed) => continue,
                Ok(Ok(payload)) => {
                    self.status.record(&self.topic);
                    if let Some(callback) = &self.callback {
                        callback(&self.topic, &payload);
                    }
                }
                Ok(Err(err)) => break Err(err),
            }
        };
        subscription.close().await;
        outcome
    }
}
