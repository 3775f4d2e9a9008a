//! The bridge: connection registry, routing table and fan-out.
//!
//! A [`Bridge`] is shared (`Arc`) by every session. It never performs I/O:
//! publishing resolves targets under the router's read lock, then offers the
//! shared message to each target's outbound queue without waiting.

use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::core::command::DecodeLimits;
use crate::core::connection::{CloseReason, ConnectionId, ConnectionState, StateCell};
use crate::core::message::Message;
use crate::core::observer::{MessageObserver, TracingObserver};
use crate::core::queue::{outbound_queue, EnqueueOutcome, OutboundQueue, OutboundReceiver};
use crate::core::side::Side;
use crate::core::topics::TopicRouter;
use crate::metrics::Metrics;

/// Bridge-side view of one live connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    side: Side,
    queue: OutboundQueue,
    state: StateCell,
    close_tx: watch::Sender<Option<CloseReason>>,
    opened_at: Instant,
    /// Milliseconds since `opened_at` of the last inbound frame or
    /// completed write.
    last_activity_ms: AtomicU64,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub(crate) fn advance(&self, next: ConnectionState) -> bool {
        self.state.advance(next)
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Asks the owning session to close. The first reason wins; returns
    /// `false` if a close was already requested.
    pub fn close(&self, reason: CloseReason) -> bool {
        self.close_tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        })
    }

    pub(crate) fn close_requests(&self) -> watch::Receiver<Option<CloseReason>> {
        self.close_tx.subscribe()
    }

    pub(crate) fn touch(&self) {
        let elapsed = self.opened_at.elapsed().as_millis() as u64;
        self.last_activity_ms.fetch_max(elapsed, Ordering::Relaxed);
    }

    pub(crate) fn idle_for(&self) -> Duration {
        let now = self.opened_at.elapsed().as_millis() as u64;
        let last = self.last_activity_ms.load(Ordering::Relaxed);
        Duration::from_millis(now.saturating_sub(last))
    }
}

/// What happened to one publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Connections whose prefixes matched.
    pub matched: usize,
    pub queued: usize,
    pub dropped: usize,
    /// Targets closed because of the disconnect overflow policy.
    pub disconnected: usize,
    /// The origin side is disabled by the configured topology.
    pub rejected: bool,
}

pub struct Bridge {
    config: Config,
    router: TopicRouter,
    connections: DashMap<ConnectionId, Arc<ConnectionHandle>>,
    metrics: Metrics,
    observer: Option<Arc<dyn MessageObserver>>,
    next_id: AtomicU64,
    marker: Bytes,
    decode_limits: DecodeLimits,
    max_frame_len: usize,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("connections", &self.connections.len())
            .field("router", &self.router.stats())
            .finish()
    }
}

impl Bridge {
    /// Builds a bridge from a validated configuration. With
    /// `routing.trace_messages` set, a [`TracingObserver`] is installed.
    pub fn new(config: Config) -> Self {
        let observer: Option<Arc<dyn MessageObserver>> = if config.routing.trace_messages {
            Some(Arc::new(TracingObserver))
        } else {
            None
        };
        let marker = Bytes::from(config.protocol.control_marker.clone().into_bytes());
        let decode_limits = config.decode_limits();
        let max_frame_len = config.max_frame_len();

        Self {
            config,
            router: TopicRouter::new(),
            connections: DashMap::new(),
            metrics: Metrics::new(),
            observer,
            next_id: AtomicU64::new(1),
            marker,
            decode_limits,
            max_frame_len,
        }
    }

    /// Replaces the message observer.
    pub fn with_observer(mut self, observer: Arc<dyn MessageObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn router(&self) -> &TopicRouter {
        &self.router
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connection(&self, id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.connections.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn control_marker(&self) -> &[u8] {
        &self.marker
    }

    pub(crate) fn decode_limits(&self) -> &DecodeLimits {
        &self.decode_limits
    }

    pub(crate) fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// Allocates an id and outbound queue for a new connection on `side`.
    pub fn register(&self, side: Side) -> (Arc<ConnectionHandle>, OutboundReceiver) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (queue, rx) = outbound_queue(
            self.config.queues.capacity,
            self.config.queues.overflow_policy,
        );
        let (close_tx, _) = watch::channel(None);

        let handle = Arc::new(ConnectionHandle {
            id,
            side,
            queue,
            state: StateCell::new(),
            close_tx,
            opened_at: Instant::now(),
            last_activity_ms: AtomicU64::new(0),
        });
        self.connections.insert(id, Arc::clone(&handle));
        self.metrics.inc_connections_opened(1);
        debug!(%id, %side, "connection registered");
        (handle, rx)
    }

    /// Forgets `id`: drops its subscriptions, then its registry entry.
    /// Pending outbound messages go with the receiver. Safe to repeat.
    pub fn unregister(&self, id: ConnectionId) {
        let removed_subs = self.router.remove_connection(id);
        if let Some((_, handle)) = self.connections.remove(&id) {
            handle.advance(ConnectionState::Closed);
            self.metrics.inc_connections_closed(1);
            debug!(%id, removed_subs, "connection unregistered");
        }
    }

    /// Adds `prefix` for a registered, not yet closing connection. Returns
    /// `false` for unknown or closing connections and for duplicates.
    pub fn subscribe(&self, conn: ConnectionId, side: Side, prefix: Bytes) -> bool {
        let live = self
            .connections
            .get(&conn)
            .is_some_and(|entry| {
                matches!(
                    entry.value().state(),
                    ConnectionState::Connecting | ConnectionState::Active
                )
            });
        if !live {
            debug!(%conn, "subscribe ignored: connection not registered");
            return false;
        }
        self.router.subscribe(conn, side, prefix)
    }

    pub fn unsubscribe(&self, conn: ConnectionId, prefix: &[u8]) -> bool {
        self.router.unsubscribe(conn, prefix)
    }

    /// Routes a message published on `origin` to every matching connection
    /// on the opposite side.
    pub fn publish(&self, origin: Side, message: Message) -> PublishReport {
        let mut report = PublishReport::default();

        if !self.config.routing.topology.allows(origin) {
            self.metrics.inc_dropped_direction(1);
            debug!(
                %origin,
                topic = %message.topic_lossy(),
                topology = %self.config.routing.topology,
                "publish dropped: direction disabled"
            );
            report.rejected = true;
            return report;
        }

        self.metrics.inc_published(1);
        if let Some(observer) = &self.observer {
            observer.on_message(origin, &message);
        }

        let targets = self.router.match_targets(&message.topic, origin);
        report.matched = targets.len();
        if targets.is_empty() {
            self.metrics.inc_unrouted(1);
            return report;
        }

        let message = Arc::new(message);
        for target in targets {
            let Some(handle) = self.connection(target) else {
                continue;
            };
            if handle.state() != ConnectionState::Active {
                continue;
            }
            match handle.queue.enqueue(Arc::clone(&message)) {
                EnqueueOutcome::Queued => report.queued += 1,
                EnqueueOutcome::Dropped => {
                    report.dropped += 1;
                    self.metrics.inc_dropped_queue_full(1);
                    debug!(
                        conn = %target,
                        topic = %message.topic_lossy(),
                        "outbound queue full; message dropped"
                    );
                }
                EnqueueOutcome::Overflow => {
                    report.dropped += 1;
                    self.metrics.inc_dropped_queue_full(1);
                    if handle.close(CloseReason::SlowSubscriber) {
                        report.disconnected += 1;
                        self.metrics.inc_slow_disconnects(1);
                        warn!(
                            conn = %target,
                            capacity = handle.queue.capacity(),
                            "outbound queue overflow; disconnecting slow subscriber"
                        );
                    }
                }
                EnqueueOutcome::Closed => {}
            }
        }

        self.metrics.inc_delivered(report.queued as u64);
        report
    }

    pub(crate) fn log_metrics(&self) {
        let m = self.metrics.snapshot();
        let r = self.router.stats();
        info!(
            target: "ezmb::metrics",
            connections = self.connections.len(),
            north_subscriptions = r.north.subscriptions,
            south_subscriptions = r.south.subscriptions,
            published = m.published,
            delivered = m.delivered,
            dropped_queue_full = m.dropped_queue_full,
            dropped_direction = m.dropped_direction,
            unrouted = m.unrouted,
            slow_disconnects = m.slow_disconnects,
            protocol_errors = m.protocol_errors,
            "bus metrics"
        );
    }
}
