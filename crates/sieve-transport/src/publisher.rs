//! Publisher - the producer end of an output endpoint
//!
//! Binds a TCP listener and serves any number of consumers. Consumers are
//! classified by their handshake:
//!
//! - sent `subscribe{ephemeral: false}`: bounded outbox, full outbox blocks
//!   the publisher (backpressure)
//! - sent `subscribe{ephemeral: true}`: 1-deep drop-oldest slot
//! - sent nothing within the handshake window: doubly ephemeral, served
//!   from a shared lossy broadcast ring with no per-consumer state
//!
//! A heartbeat task pings every handshaked consumer once a second; five
//! consecutive missed pongs recycle the slot.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use sieve_protocol::Frame;
use socket2::{SockRef, TcpKeepalive};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument, Span};

use crate::error::TransportError;
use crate::wire::{self, Hello, Message};
use crate::{Result, DEFAULT_OUTBOX_CAPACITY, HEARTBEAT_INTERVAL, MAX_MISSED_PONGS};

/// Default window for the consumer's subscribe message; silence past it
/// classifies the consumer as doubly ephemeral.
const DEFAULT_HANDSHAKE_WINDOW: Duration = Duration::from_secs(5);

/// Depth of the lossy ring serving doubly-ephemeral consumers
const SILENT_RING_DEPTH: usize = 32;

/// Publisher configuration
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Bind address; `*` as host binds all interfaces
    pub bind: String,

    /// Filter id announced in the hello message
    pub producer_id: String,

    /// Run id announced in the hello message
    pub run_id: String,

    /// Topics this producer announces
    pub topics: Vec<String>,

    /// Outbox depth per non-ephemeral consumer
    pub outbox_capacity: usize,

    /// Interval between heartbeat pings
    pub heartbeat_interval: Duration,

    /// Consecutive missed pongs before the slot is closed
    pub max_missed_pongs: u32,

    /// Enable TCP keepalive on accepted sockets
    pub keepalive: bool,

    /// How long to wait for `subscribe` before treating the consumer as
    /// doubly ephemeral
    pub handshake_window: Duration,
}

impl PublisherConfig {
    /// Create a config with runtime defaults
    pub fn new(
        bind: impl Into<String>,
        producer_id: impl Into<String>,
        run_id: impl Into<String>,
    ) -> Self {
        Self {
            bind: bind.into(),
            producer_id: producer_id.into(),
            run_id: run_id.into(),
            topics: vec!["main".to_string()],
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            max_missed_pongs: MAX_MISSED_PONGS,
            keepalive: true,
            handshake_window: DEFAULT_HANDSHAKE_WINDOW,
        }
    }

    /// Set the announced topics
    #[must_use]
    pub fn with_topics(mut self, topics: Vec<String>) -> Self {
        self.topics = topics;
        self
    }

    /// Set the per-consumer outbox depth
    #[must_use]
    pub fn with_outbox_capacity(mut self, capacity: usize) -> Self {
        self.outbox_capacity = capacity.max(1);
        self
    }

    /// Set the heartbeat interval
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}

/// Counters exposed by a publisher
#[derive(Debug, Clone, Default)]
pub struct PublisherStats {
    pub frames_published: u64,
    pub bytes_published: u64,
    pub consumers_connected: u64,
    pub consumers_dropped: u64,
}

#[derive(Debug, Default)]
struct Stats {
    frames_published: AtomicU64,
    bytes_published: AtomicU64,
    consumers_connected: AtomicU64,
    consumers_dropped: AtomicU64,
}

/// Topic interest of a handshaked consumer; `None` means all topics
type TopicSet = Option<HashSet<String>>;

fn wants(topics: &TopicSet, topic: &str) -> bool {
    match topics {
        None => true,
        Some(set) => set.contains(topic),
    }
}

fn topic_set(topics: Vec<String>) -> TopicSet {
    if topics.iter().any(|t| t == "*") {
        None
    } else {
        Some(topics.into_iter().collect())
    }
}

struct DurableSlot {
    id: u64,
    topics: TopicSet,
    sender: mpsc::Sender<Bytes>,
}

struct EphemeralSlot {
    id: u64,
    topics: TopicSet,
    sender: watch::Sender<Bytes>,
}

struct Shared {
    config: PublisherConfig,
    durable: Mutex<Vec<DurableSlot>>,
    ephemeral: Mutex<Vec<EphemeralSlot>>,
    silent: broadcast::Sender<Bytes>,
    subscriber_count: watch::Sender<usize>,
    next_slot_id: AtomicU64,
    stats: Stats,
}

impl Shared {
    async fn update_count(&self) {
        let count = self.durable.lock().await.len() + self.ephemeral.lock().await.len();
        let _ = self.subscriber_count.send(count);
    }

    async fn drop_durable(&self, id: u64) {
        self.durable.lock().await.retain(|slot| slot.id != id);
        self.stats.consumers_dropped.fetch_add(1, Ordering::Relaxed);
        self.update_count().await;
    }

    async fn drop_ephemeral(&self, id: u64) {
        self.ephemeral.lock().await.retain(|slot| slot.id != id);
        self.stats.consumers_dropped.fetch_add(1, Ordering::Relaxed);
        self.update_count().await;
    }
}

/// The producer end of one output endpoint
pub struct Publisher {
    shared: Arc<Shared>,
    local_addr: SocketAddr,
    count_rx: watch::Receiver<usize>,
    cancel: CancellationToken,
}

impl Publisher {
    /// Bind the endpoint and start accepting consumers
    pub async fn bind(config: PublisherConfig) -> Result<Self> {
        let bind_addr = config.bind.replace('*', "0.0.0.0");
        let listener = TcpListener::bind(&bind_addr).await?;
        let local_addr = listener.local_addr()?;

        let (count_tx, count_rx) = watch::channel(0usize);
        let (silent_tx, _) = broadcast::channel(SILENT_RING_DEPTH);
        let shared = Arc::new(Shared {
            config,
            durable: Mutex::new(Vec::new()),
            ephemeral: Mutex::new(Vec::new()),
            silent: silent_tx,
            subscriber_count: count_tx,
            next_slot_id: AtomicU64::new(1),
            stats: Stats::default(),
        });

        let cancel = CancellationToken::new();
        // Inherit the caller's span (the owning filter) on every task.
        tokio::spawn(
            accept_loop(listener, Arc::clone(&shared), cancel.clone())
                .instrument(Span::current()),
        );

        info!(
            addr = %local_addr,
            producer = %shared.config.producer_id,
            "publisher listening"
        );

        Ok(Self {
            shared,
            local_addr,
            count_rx,
            cancel,
        })
    }

    /// The bound socket address (useful with port 0)
    #[inline]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of handshaked consumers (doubly-ephemeral ones are invisible)
    pub fn consumer_count(&self) -> usize {
        *self.count_rx.borrow()
    }

    /// Wait until at least `n` consumers have handshaked
    pub async fn wait_for_consumers(&self, n: usize) -> Result<()> {
        let mut rx = self.count_rx.clone();
        loop {
            if *rx.borrow_and_update() >= n {
                return Ok(());
            }
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return Err(TransportError::Closed);
                    }
                }
                _ = self.cancel.cancelled() => return Err(TransportError::Closed),
            }
        }
    }

    /// Publish a frame on its `meta.topic`
    ///
    /// Awaits while any non-ephemeral consumer's outbox is full; ephemeral
    /// and doubly-ephemeral consumers never hold this back. Returns the
    /// number of non-ephemeral consumers the frame was queued to.
    pub async fn publish(&self, frame: &Frame) -> Result<usize> {
        let topic = frame.topic().to_string();
        let encoded = sieve_protocol::encode(frame)?;
        let message = wire::encode_message(&Message::Frame(encoded))?;
        self.publish_message(&topic, message).await
    }

    /// Announce end-of-stream for a topic
    pub async fn send_eos(&self, topic: &str) -> Result<()> {
        let message = wire::encode_message(&Message::Eos {
            topic: topic.to_string(),
        })?;
        self.publish_message(topic, message).await?;
        Ok(())
    }

    async fn publish_message(&self, topic: &str, message: Bytes) -> Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::Closed);
        }

        let shared = &self.shared;
        shared.stats.frames_published.fetch_add(1, Ordering::Relaxed);
        shared
            .stats
            .bytes_published
            .fetch_add(message.len() as u64, Ordering::Relaxed);

        // Doubly-ephemeral ring: lossy, never blocks, no per-consumer state.
        let _ = shared.silent.send(message.clone());

        // Ephemeral slots: latest-value, drop-oldest.
        {
            let ephemeral = shared.ephemeral.lock().await;
            for slot in ephemeral.iter() {
                if wants(&slot.topics, topic) {
                    let _ = slot.sender.send_replace(message.clone());
                }
            }
        }

        // Durable slots: bounded outboxes. Senders are cloned out of the
        // lock so a slow consumer cannot hold it while we await capacity.
        let targets: Vec<(u64, mpsc::Sender<Bytes>)> = {
            let durable = shared.durable.lock().await;
            durable
                .iter()
                .filter(|slot| wants(&slot.topics, topic))
                .map(|slot| (slot.id, slot.sender.clone()))
                .collect()
        };

        let mut delivered = 0;
        for (id, sender) in targets {
            match sender.send(message.clone()).await {
                Ok(()) => delivered += 1,
                Err(_) => {
                    // Receiver side exited between collection and send.
                    shared.drop_durable(id).await;
                }
            }
        }
        Ok(delivered)
    }

    /// Current counter values
    pub fn stats(&self) -> PublisherStats {
        let stats = &self.shared.stats;
        PublisherStats {
            frames_published: stats.frames_published.load(Ordering::Relaxed),
            bytes_published: stats.bytes_published.load(Ordering::Relaxed),
            consumers_connected: stats.consumers_connected.load(Ordering::Relaxed),
            consumers_dropped: stats.consumers_dropped.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting and close every consumer connection
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>, cancel: CancellationToken) {
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = cancel.cancelled() => break,
        };
        match accepted {
            Ok((stream, addr)) => {
                if shared.config.keepalive {
                    apply_keepalive(&stream);
                }
                tokio::spawn(
                    serve_consumer(stream, addr, Arc::clone(&shared), cancel.clone())
                        .instrument(Span::current()),
                );
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

fn apply_keepalive(stream: &TcpStream) {
    let sock = SockRef::from(stream);
    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(30))
        .with_interval(Duration::from_secs(10));
    if let Err(e) = sock.set_tcp_keepalive(&keepalive) {
        debug!(error = %e, "failed to set TCP keepalive");
    }
    let _ = sock.set_nodelay(true);
}

async fn serve_consumer(
    stream: TcpStream,
    addr: SocketAddr,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    let (mut read_half, mut write_half) = stream.into_split();

    let hello = Message::Hello(Hello {
        producer_id: shared.config.producer_id.clone(),
        run_id: shared.config.run_id.clone(),
        topics: shared.config.topics.clone(),
    });
    if let Err(e) = wire::write_message(&mut write_half, &hello).await {
        debug!(%addr, error = %e, "hello write failed");
        return;
    }

    // Classify the consumer by its first message. Silence within the
    // window means doubly ephemeral.
    let window = shared.config.handshake_window;
    let first = tokio::select! {
        first = tokio::time::timeout(window, wire::read_message(&mut read_half)) => first,
        _ = cancel.cancelled() => return,
    };

    shared.stats.consumers_connected.fetch_add(1, Ordering::Relaxed);

    match first {
        Ok(Ok(Message::Subscribe { topics, ephemeral })) => {
            let interest = topic_set(topics);
            if ephemeral {
                serve_ephemeral(read_half, write_half, addr, interest, shared, cancel).await;
            } else {
                serve_durable(read_half, write_half, addr, interest, shared, cancel).await;
            }
        }
        Err(_elapsed) => {
            debug!(%addr, "no subscribe within window, serving as doubly ephemeral");
            serve_silent(write_half, addr, shared, cancel).await;
        }
        Ok(Ok(other)) => {
            warn!(%addr, kind = other.kind(), "handshake failed: unexpected message");
        }
        Ok(Err(e)) => {
            debug!(%addr, error = %e, "handshake read failed");
        }
    }
}

/// Watch the read half for pongs, resetting the missed counter
fn spawn_pong_reader(
    mut read_half: OwnedReadHalf,
    pong_tx: mpsc::UnboundedSender<()>,
    closed: CancellationToken,
) {
    let reader = async move {
        loop {
            match wire::read_message(&mut read_half).await {
                Ok(Message::Pong { .. }) => {
                    if pong_tx.send(()).is_err() {
                        break;
                    }
                }
                Ok(other) => {
                    debug!(kind = other.kind(), "ignoring unexpected consumer message");
                }
                Err(_) => break,
            }
        }
        closed.cancel();
    };
    tokio::spawn(reader.instrument(Span::current()));
}

struct Heartbeat {
    interval: tokio::time::Interval,
    missed: u32,
    max_missed: u32,
}

impl Heartbeat {
    fn new(config: &PublisherConfig) -> Self {
        let mut interval = tokio::time::interval(config.heartbeat_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        Self {
            interval,
            missed: 0,
            max_missed: config.max_missed_pongs,
        }
    }

    /// Record a tick; true when the peer is considered gone
    fn tick(&mut self) -> bool {
        self.missed += 1;
        self.missed > self.max_missed
    }

    fn pong(&mut self) {
        self.missed = 0;
    }
}

fn now_nanos() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

async fn serve_durable(
    read_half: OwnedReadHalf,
    mut write_half: OwnedWriteHalf,
    addr: SocketAddr,
    topics: TopicSet,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    let slot_id = shared.next_slot_id.fetch_add(1, Ordering::Relaxed);
    let (outbox_tx, mut outbox_rx) = mpsc::channel::<Bytes>(shared.config.outbox_capacity);

    shared.durable.lock().await.push(DurableSlot {
        id: slot_id,
        topics,
        sender: outbox_tx,
    });
    shared.update_count().await;
    debug!(%addr, slot_id, "durable consumer subscribed");

    let peer_closed = CancellationToken::new();
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel();
    spawn_pong_reader(read_half, pong_tx, peer_closed.clone());

    let mut heartbeat = Heartbeat::new(&shared.config);
    loop {
        tokio::select! {
            message = outbox_rx.recv() => {
                let Some(message) = message else { break };
                if wire::write_encoded(&mut write_half, &message).await.is_err() {
                    warn!(%addr, "durable consumer write failed, recycling slot");
                    break;
                }
            }
            _ = heartbeat.interval.tick() => {
                if heartbeat.tick() {
                    warn!(%addr, "consumer missed {} pongs, recycling slot", heartbeat.max_missed);
                    break;
                }
                let ping = match wire::encode_message(&Message::Ping { ts: now_nanos() }) {
                    Ok(ping) => ping,
                    Err(_) => break,
                };
                if wire::write_encoded(&mut write_half, &ping).await.is_err() {
                    break;
                }
            }
            _ = pong_rx.recv() => heartbeat.pong(),
            _ = peer_closed.cancelled() => break,
            _ = cancel.cancelled() => break,
        }
    }

    shared.drop_durable(slot_id).await;
    debug!(%addr, slot_id, "durable consumer slot closed");
}

async fn serve_ephemeral(
    read_half: OwnedReadHalf,
    mut write_half: OwnedWriteHalf,
    addr: SocketAddr,
    topics: TopicSet,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    let slot_id = shared.next_slot_id.fetch_add(1, Ordering::Relaxed);
    let (slot_tx, mut slot_rx) = watch::channel(Bytes::new());

    shared.ephemeral.lock().await.push(EphemeralSlot {
        id: slot_id,
        topics,
        sender: slot_tx,
    });
    shared.update_count().await;
    debug!(%addr, slot_id, "ephemeral consumer subscribed");

    let peer_closed = CancellationToken::new();
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel();
    spawn_pong_reader(read_half, pong_tx, peer_closed.clone());

    let mut heartbeat = Heartbeat::new(&shared.config);
    loop {
        tokio::select! {
            changed = slot_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                // Only the latest frame survives; anything older was
                // already overwritten in the slot.
                let message = slot_rx.borrow_and_update().clone();
                if message.is_empty() {
                    continue;
                }
                if wire::write_encoded(&mut write_half, &message).await.is_err() {
                    break;
                }
            }
            _ = heartbeat.interval.tick() => {
                if heartbeat.tick() {
                    warn!(%addr, "ephemeral consumer missed pongs, recycling slot");
                    break;
                }
                let ping = match wire::encode_message(&Message::Ping { ts: now_nanos() }) {
                    Ok(ping) => ping,
                    Err(_) => break,
                };
                if wire::write_encoded(&mut write_half, &ping).await.is_err() {
                    break;
                }
            }
            _ = pong_rx.recv() => heartbeat.pong(),
            _ = peer_closed.cancelled() => break,
            _ = cancel.cancelled() => break,
        }
    }

    shared.drop_ephemeral(slot_id).await;
    debug!(%addr, slot_id, "ephemeral consumer slot closed");
}

async fn serve_silent(
    mut write_half: OwnedWriteHalf,
    addr: SocketAddr,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    let mut ring = shared.silent.subscribe();
    loop {
        let received = tokio::select! {
            received = ring.recv() => received,
            _ = cancel.cancelled() => break,
        };
        match received {
            Ok(message) => {
                if wire::write_encoded(&mut write_half, &message).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                // Lossy by contract; order within the ring is preserved.
                debug!(%addr, skipped, "doubly-ephemeral consumer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!(%addr, "doubly-ephemeral consumer disconnected");
}
