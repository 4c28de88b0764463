//! Subscriber - the consumer end of a source endpoint
//!
//! Connects to a publisher, handshakes, and delivers decoded frames and
//! stream events through a bounded queue. Reconnects forever with jittered
//! exponential backoff until stopped.

use std::collections::HashSet;
use std::time::Duration;

use sieve_protocol::Frame;
use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument, Span};

use crate::backoff::Backoff;
use crate::error::TransportError;
use crate::wire::{self, Hello, Message};
use crate::Result;

/// How long to wait for the producer's hello after connecting
const HELLO_TIMEOUT: Duration = Duration::from_secs(5);

/// How a subscriber presents itself to the producer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscribeKind {
    /// Handshakes and holds a bounded outbox upstream (backpressure)
    #[default]
    Durable,
    /// Handshakes but upstream keeps only the latest frame for it
    Ephemeral,
    /// Never handshakes; upstream is unaware of it (doubly ephemeral)
    Silent,
}

/// Subscriber configuration
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Producer address, `host:port`
    pub addr: String,

    /// Wire topics to receive; `*` subscribes to everything
    pub topics: Vec<String>,

    /// Flow-control participation
    pub kind: SubscribeKind,

    /// Depth of the delivery queue toward the synchronizer
    pub queue_capacity: usize,

    /// Enable TCP keepalive
    pub keepalive: bool,
}

impl SubscriberConfig {
    /// Create a config with runtime defaults
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            topics: vec!["main".to_string()],
            kind: SubscribeKind::Durable,
            queue_capacity: 8,
            keepalive: true,
        }
    }

    /// Set the subscribed topics
    #[must_use]
    pub fn with_topics(mut self, topics: Vec<String>) -> Self {
        self.topics = topics;
        self
    }

    /// Set the flow-control kind
    #[must_use]
    pub fn with_kind(mut self, kind: SubscribeKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Events delivered by a subscriber
#[derive(Debug)]
pub enum SubscriberEvent {
    /// Connection established and producer greeted us
    Connected(Hello),
    /// A decoded frame
    Frame(Frame),
    /// The producer announced end-of-stream for a topic
    Eos { topic: String },
    /// Connection lost; reconnect backoff is underway
    Disconnected,
}

/// The consumer end of one source endpoint
pub struct Subscriber {
    events: mpsc::Receiver<SubscriberEvent>,
    cancel: CancellationToken,
}

impl Subscriber {
    /// Start connecting; events arrive once the producer is reachable
    ///
    /// The connection task inherits the caller's span, so its logs stay
    /// attributed to the owning filter.
    pub fn connect(config: SubscriberConfig) -> Self {
        let (event_tx, events) = mpsc::channel(config.queue_capacity.max(1));
        let cancel = CancellationToken::new();
        tokio::spawn(run(config, event_tx, cancel.clone()).instrument(Span::current()));
        Self { events, cancel }
    }

    /// Next event; `None` after [`Subscriber::stop`] drains out
    pub async fn next(&mut self) -> Option<SubscriberEvent> {
        self.events.recv().await
    }

    /// Non-blocking poll for the next event
    pub fn try_next(&mut self) -> Option<SubscriberEvent> {
        self.events.try_recv().ok()
    }

    /// Stop reconnecting and close the connection
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    config: SubscriberConfig,
    events: mpsc::Sender<SubscriberEvent>,
    cancel: CancellationToken,
) {
    let mut backoff = Backoff::default();
    let mut announced = false;

    while !cancel.is_cancelled() {
        let connected = tokio::select! {
            connected = TcpStream::connect(&config.addr) => connected,
            _ = cancel.cancelled() => break,
        };

        let stream = match connected {
            Ok(stream) => stream,
            Err(e) => {
                if backoff.attempt() == 0 {
                    warn!(addr = %config.addr, error = %e, "connect failed, backing off");
                } else {
                    debug!(addr = %config.addr, attempt = backoff.attempt(), "reconnect failed");
                }
                let delay = backoff.next_delay();
                tokio::select! {
                    _ = tokio::time::sleep(delay) => continue,
                    _ = cancel.cancelled() => break,
                }
            }
        };

        if config.keepalive {
            let sock = SockRef::from(&stream);
            let keepalive = TcpKeepalive::new().with_time(Duration::from_secs(30));
            let _ = sock.set_tcp_keepalive(&keepalive);
            let _ = sock.set_nodelay(true);
        }

        backoff.reset();
        if !announced {
            info!(addr = %config.addr, kind = ?config.kind, "subscriber connected");
            announced = true;
        }

        match serve(&config, stream, &events, &cancel).await {
            Ok(()) => break, // clean shutdown
            Err(e) => {
                debug!(addr = %config.addr, error = %e, "connection lost");
                if events.send(SubscriberEvent::Disconnected).await.is_err() {
                    break;
                }
                let delay = backoff.next_delay();
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => break,
                }
            }
        }
    }
}

/// Serve one live connection; `Ok` means a deliberate stop
async fn serve(
    config: &SubscriberConfig,
    stream: TcpStream,
    events: &mpsc::Sender<SubscriberEvent>,
    cancel: &CancellationToken,
) -> Result<()> {
    let (mut read_half, mut write_half) = stream.into_split();

    // The producer speaks first.
    let hello = match tokio::time::timeout(HELLO_TIMEOUT, wire::read_message(&mut read_half)).await
    {
        Ok(Ok(Message::Hello(hello))) => hello,
        Ok(Ok(other)) => {
            return Err(TransportError::HandshakeFailed {
                reason: format!("expected hello, got {}", other.kind()),
            })
        }
        Ok(Err(e)) => return Err(e),
        Err(_elapsed) => {
            return Err(TransportError::HandshakeFailed {
                reason: "no hello within timeout".into(),
            })
        }
    };

    // Silent subscribers never announce themselves.
    if config.kind != SubscribeKind::Silent {
        wire::write_message(
            &mut write_half,
            &Message::Subscribe {
                topics: config.topics.clone(),
                ephemeral: config.kind == SubscribeKind::Ephemeral,
            },
        )
        .await?;
    }

    if events
        .send(SubscriberEvent::Connected(hello))
        .await
        .is_err()
    {
        return Ok(());
    }

    let all_topics = config.topics.iter().any(|t| t == "*");
    let interest: HashSet<&str> = config.topics.iter().map(String::as_str).collect();

    loop {
        let message = tokio::select! {
            message = wire::read_message(&mut read_half) => message,
            _ = cancel.cancelled() => return Ok(()),
        };

        match message {
            Ok(Message::Ping { ts }) => {
                if config.kind != SubscribeKind::Silent {
                    wire::write_message(&mut write_half, &Message::Pong { ts }).await?;
                }
            }
            Ok(Message::Frame(encoded)) => {
                let frame = match sieve_protocol::decode(encoded.header, encoded.image) {
                    Ok(frame) => frame,
                    Err(e) => {
                        // Recoverable: drop the frame, keep the connection.
                        warn!(addr = %config.addr, error = %e, "dropping undecodable frame");
                        continue;
                    }
                };
                if !all_topics && !interest.contains(frame.topic()) {
                    continue;
                }
                // Awaiting here is the local backpressure path: a full
                // queue stops socket reads, which stalls the producer's
                // outbox for durable subscribers.
                if events.send(SubscriberEvent::Frame(frame)).await.is_err() {
                    return Ok(());
                }
            }
            Ok(Message::Eos { topic }) => {
                if events.send(SubscriberEvent::Eos { topic }).await.is_err() {
                    return Ok(());
                }
            }
            Ok(other) => {
                debug!(kind = other.kind(), "ignoring unexpected producer message");
            }
            Err(TransportError::Closed) => {
                return Err(TransportError::PeerGone {
                    addr: config.addr.clone(),
                })
            }
            Err(e) => return Err(e),
        }
    }
}
