//! Synchronizer - multi-source tick assembly
//!
//! Frames from every source arrive on one intake channel, already remapped
//! to their local topic names. `next` assembles them into ticks according
//! to the configured mode.
//!
//! Non-ephemeral topics hold a FIFO of waiting frames; the input side never
//! silently discards one except for explicit alignment drops. Ephemeral
//! topics keep only the latest frame and never block assembly.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use sieve_config::{SyncMode, WILDCARD_TOPIC};
use sieve_protocol::Frame;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::SyncError;

/// One subscribed local topic
#[derive(Debug, Clone)]
pub struct TopicSpec {
    pub name: String,
    pub ephemeral: bool,
}

impl TopicSpec {
    /// A non-ephemeral topic
    pub fn durable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ephemeral: false,
        }
    }

    /// An ephemeral topic
    pub fn ephemeral(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ephemeral: true,
        }
    }
}

/// Synchronizer configuration
#[derive(Debug, Clone)]
pub struct SynchronizerConfig {
    /// Tick assembly mode
    pub mode: SyncMode,
    /// Orphan/partial-tick window
    pub window: Duration,
    /// Subscribed topics; a `*` entry admits topics discovered at runtime
    /// with the same ephemerality
    pub topics: Vec<TopicSpec>,
}

/// Events fed into the synchronizer by the source pumps
#[derive(Debug)]
pub enum SyncEvent {
    /// A frame arrived, already remapped to its local topic
    Frame { topic: String, frame: Frame },
    /// The upstream producer declared end-of-stream for a topic
    Eos { topic: String },
}

/// The bundle of frames one `process` call observes
///
/// Entries follow topic declaration order; topics with nothing pending are
/// `None` in loose and degraded-strict ticks.
#[derive(Debug, Default)]
pub struct Tick {
    entries: Vec<(String, Option<Frame>)>,
}

impl Tick {
    /// The frame for a topic, if present in this tick
    pub fn get(&self, topic: &str) -> Option<&Frame> {
        self.entries
            .iter()
            .find(|(name, _)| name == topic)
            .and_then(|(_, frame)| frame.as_ref())
    }

    /// Iterate all entries, present or not
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Frame>)> {
        self.entries
            .iter()
            .map(|(name, frame)| (name.as_str(), frame.as_ref()))
    }

    /// Iterate only the topics that carry a frame
    pub fn present(&self) -> impl Iterator<Item = (&str, &Frame)> {
        self.entries
            .iter()
            .filter_map(|(name, frame)| frame.as_ref().map(|f| (name.as_str(), f)))
    }

    /// Number of topics carrying a frame
    pub fn frame_count(&self) -> usize {
        self.entries.iter().filter(|(_, f)| f.is_some()).count()
    }

    /// True when no topic carries a frame
    pub fn is_empty(&self) -> bool {
        self.frame_count() == 0
    }

    /// Consume the tick into its entries
    pub fn into_entries(self) -> Vec<(String, Option<Frame>)> {
        self.entries
    }
}

/// Synchronizer counters
#[derive(Debug, Default, Clone)]
pub struct SyncStats {
    /// Ticks delivered to `process`
    pub ticks_delivered: u64,
    /// Alignment/expiry drops per topic
    pub drops: HashMap<String, u64>,
    /// Recoverable sync errors (deadline, orphan expiry)
    pub sync_errors: u64,
}

impl SyncStats {
    /// Drop count for one topic
    pub fn drop_count(&self, topic: &str) -> u64 {
        self.drops.get(topic).copied().unwrap_or(0)
    }
}

struct Waiting {
    frame: Frame,
    arrived: Instant,
}

/// Multi-source tick assembler
pub struct Synchronizer {
    mode: SyncMode,
    window: Duration,
    /// Topic names in declaration (then discovery) order
    order: Vec<String>,
    ephemeral: HashSet<String>,
    /// Ephemerality applied to topics discovered through `*`
    wildcard: Option<bool>,
    queues: HashMap<String, VecDeque<Waiting>>,
    latest: HashMap<String, Frame>,
    fresh: HashSet<String>,
    eos: HashSet<String>,
    rx: mpsc::Receiver<SyncEvent>,
    intake_open: bool,
    stats: SyncStats,
}

impl Synchronizer {
    /// Create a synchronizer and the sender its source pumps feed
    pub fn channel(config: SynchronizerConfig) -> (mpsc::Sender<SyncEvent>, Synchronizer) {
        let capacity = (config.topics.len() * 4).max(8);
        let (tx, rx) = mpsc::channel(capacity);

        let mut order = Vec::new();
        let mut ephemeral = HashSet::new();
        let mut queues = HashMap::new();
        let mut wildcard = None;

        for spec in &config.topics {
            if spec.name == WILDCARD_TOPIC {
                wildcard = Some(spec.ephemeral);
                continue;
            }
            if order.contains(&spec.name) {
                continue;
            }
            order.push(spec.name.clone());
            if spec.ephemeral {
                ephemeral.insert(spec.name.clone());
            } else {
                queues.insert(spec.name.clone(), VecDeque::new());
            }
        }

        let sync = Synchronizer {
            mode: config.mode,
            window: config.window,
            order,
            ephemeral,
            wildcard,
            queues,
            latest: HashMap::new(),
            fresh: HashSet::new(),
            eos: HashSet::new(),
            rx,
            intake_open: true,
            stats: SyncStats::default(),
        };
        (tx, sync)
    }

    /// Current counters
    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Assemble the next tick
    ///
    /// Returns `None` once every non-ephemeral topic reached end-of-stream
    /// and its queue drained, or the intake closed with nothing pending.
    pub async fn next(&mut self) -> Option<Tick> {
        loop {
            self.align();
            if let Some(tick) = self.try_assemble(false) {
                self.stats.ticks_delivered += 1;
                return Some(tick);
            }
            if self.finished() {
                return None;
            }

            let event = match self.pending_deadline() {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                        Ok(event) => event,
                        Err(_elapsed) => {
                            self.on_window_expired();
                            if let Some(tick) = self.try_assemble(true) {
                                self.stats.ticks_delivered += 1;
                                return Some(tick);
                            }
                            continue;
                        }
                    }
                }
                None => self.rx.recv().await,
            };

            match event {
                Some(event) => self.accept(event),
                None => {
                    self.intake_open = false;
                    self.align();
                    if let Some(tick) = self.try_assemble(true) {
                        self.stats.ticks_delivered += 1;
                        return Some(tick);
                    }
                    return None;
                }
            }
        }
    }

    fn accept(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::Frame { topic, frame } => {
                if !self.known(&topic) && !self.discover(&topic) {
                    debug!(topic, "dropping frame for unsubscribed topic");
                    return;
                }
                if self.ephemeral.contains(&topic) {
                    self.latest.insert(topic.clone(), frame);
                    self.fresh.insert(topic);
                    return;
                }
                if self.mode == SyncMode::ById && frame.id().is_none() {
                    warn!(topic, "dropping frame without meta.id in by-id mode");
                    *self.stats.drops.entry(topic).or_default() += 1;
                    return;
                }
                if let Some(queue) = self.queues.get_mut(&topic) {
                    queue.push_back(Waiting {
                        frame,
                        arrived: Instant::now(),
                    });
                }
            }
            SyncEvent::Eos { topic } => {
                debug!(topic, "end-of-stream");
                self.eos.insert(topic);
            }
        }
    }

    fn known(&self, topic: &str) -> bool {
        self.order.iter().any(|name| name == topic)
    }

    /// Register a topic discovered through a wildcard subscription
    fn discover(&mut self, topic: &str) -> bool {
        let Some(ephemeral) = self.wildcard else {
            return false;
        };
        self.order.push(topic.to_string());
        if ephemeral {
            self.ephemeral.insert(topic.to_string());
        } else {
            self.queues.insert(topic.to_string(), VecDeque::new());
        }
        debug!(topic, ephemeral, "discovered wildcard topic");
        true
    }

    /// Non-ephemeral topic names in order
    fn durable_topics(&self) -> impl Iterator<Item = &String> {
        self.order
            .iter()
            .filter(|name| !self.ephemeral.contains(*name))
    }

    /// By-id alignment: drop straggler heads until all heads carry the
    /// same id
    fn align(&mut self) {
        if self.mode != SyncMode::ById {
            return;
        }
        loop {
            let heads: Vec<(String, i64)> = {
                let mut heads = Vec::new();
                for name in self.durable_topics() {
                    match self.queues[name].front() {
                        Some(waiting) => {
                            heads.push((name.clone(), waiting.frame.id().unwrap_or(0)))
                        }
                        // Terminated topics cannot contribute; anything
                        // else empty means wait for more frames.
                        None if self.eos.contains(name) => {}
                        None => return,
                    }
                }
                heads
            };
            if heads.is_empty() {
                return;
            }
            let target = heads.iter().map(|(_, id)| *id).max().unwrap_or(0);
            if heads.iter().all(|(_, id)| *id == target) {
                return;
            }
            for (name, id) in heads {
                if id < target {
                    if let Some(queue) = self.queues.get_mut(&name) {
                        queue.pop_front();
                    }
                    *self.stats.drops.entry(name.clone()).or_default() += 1;
                    debug!(topic = %name, id, target, "dropped unaligned frame");
                }
            }
        }
    }

    /// Try to build a tick; `force` admits partial strict/by-id ticks
    fn try_assemble(&mut self, force: bool) -> Option<Tick> {
        let durable: Vec<String> = self.durable_topics().cloned().collect();
        let any_pending =
            durable.iter().any(|name| !self.queues[name].is_empty()) || !self.fresh.is_empty();
        if !any_pending {
            return None;
        }

        let all_full = durable.iter().all(|name| !self.queues[name].is_empty());
        // Topics already at end-of-stream cannot be waited for.
        let all_live_full = durable
            .iter()
            .all(|name| !self.queues[name].is_empty() || self.eos.contains(name));
        let ready = match self.mode {
            SyncMode::Loose => true,
            SyncMode::Strict => all_full || force || all_live_full,
            // By-id ticks are only ever aligned bundles; a partial tick
            // would break the equal-id invariant.
            SyncMode::ById => all_full || all_live_full,
        };
        if !ready {
            return None;
        }

        let mut entries = Vec::with_capacity(self.order.len());
        for name in &self.order {
            if self.ephemeral.contains(name) {
                // Latest value, possibly stale; never blocks.
                entries.push((name.clone(), self.latest.get(name).cloned()));
                self.fresh.remove(name);
            } else {
                let frame = self
                    .queues
                    .get_mut(name)
                    .and_then(|queue| queue.pop_front())
                    .map(|waiting| waiting.frame);
                entries.push((name.clone(), frame));
            }
        }
        if entries.iter().all(|(_, frame)| frame.is_none()) {
            return None;
        }
        Some(Tick { entries })
    }

    /// True when no further tick can ever be assembled
    fn finished(&self) -> bool {
        let queues_empty = self.queues.values().all(VecDeque::is_empty);
        if !queues_empty || !self.fresh.is_empty() {
            return false;
        }
        if !self.intake_open {
            return true;
        }
        let mut durable = self.durable_topics().peekable();
        durable.peek().is_some() && self.durable_topics().all(|name| self.eos.contains(name))
    }

    /// Deadline for degrading a partial tick, if one is pending
    fn pending_deadline(&self) -> Option<Instant> {
        if self.mode == SyncMode::Loose {
            return None;
        }
        let oldest = self
            .queues
            .values()
            .filter_map(|queue| queue.front())
            .map(|waiting| waiting.arrived)
            .min()?;
        Some(oldest + self.window)
    }

    /// The window lapsed with a partial tick pending
    fn on_window_expired(&mut self) {
        match self.mode {
            SyncMode::Loose => {}
            SyncMode::Strict => {
                for name in self.durable_topics() {
                    if self.queues[name].is_empty() && !self.eos.contains(name) {
                        let err = SyncError::TickDeadline {
                            topic: name.clone(),
                            waited: self.window,
                        };
                        warn!(topic = %name, error = %err, "degrading to partial tick");
                    }
                }
                self.stats.sync_errors += 1;
            }
            SyncMode::ById => {
                // Expire waiting orphans so stalled peers cannot pin memory.
                let now = Instant::now();
                let window = self.window;
                for (name, queue) in self.queues.iter_mut() {
                    while let Some(waiting) = queue.front() {
                        if now.duration_since(waiting.arrived) < window {
                            break;
                        }
                        let id = waiting.frame.id().unwrap_or(0);
                        let err = SyncError::OrphanExpired {
                            topic: name.clone(),
                            id,
                        };
                        warn!(topic = %name, id, error = %err, "dropping expired orphan");
                        queue.pop_front();
                        *self.stats.drops.entry(name.clone()).or_default() += 1;
                    }
                }
                self.stats.sync_errors += 1;
            }
        }
    }
}
