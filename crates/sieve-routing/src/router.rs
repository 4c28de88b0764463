//! OutputRouter - produced-frame fan-out
//!
//! After `process` returns, each produced frame is matched against the
//! topic rewrites of every output and queued to the matching publish
//! lanes. Sending awaits lane capacity, which is how downstream
//! backpressure reaches `process`.

use std::collections::HashSet;

use sieve_config::TopicMap;
use sieve_protocol::Frame;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Router counters
#[derive(Debug, Default, Clone)]
pub struct RouterStats {
    /// Frames queued to at least one lane
    pub frames_routed: u64,
    /// Frames whose topic matched no output rule
    pub frames_unroutable: u64,
    /// Individual lane sends
    pub lane_sends: u64,
    /// Sends that failed because a lane closed
    pub lane_failures: u64,
}

struct Lane {
    name: String,
    topics: Vec<TopicMap>,
    sender: mpsc::Sender<Frame>,
}

/// Fan-out of produced frames to output publish lanes
pub struct OutputRouter {
    lanes: Vec<Lane>,
    warned_topics: HashSet<String>,
    stats: RouterStats,
}

impl Default for OutputRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputRouter {
    /// Create an empty router
    pub fn new() -> Self {
        Self {
            lanes: Vec::new(),
            warned_topics: HashSet::new(),
            stats: RouterStats::default(),
        }
    }

    /// Register a publish lane with its topic rewrites
    pub fn add_lane(
        &mut self,
        name: impl Into<String>,
        topics: Vec<TopicMap>,
        sender: mpsc::Sender<Frame>,
    ) {
        let name = name.into();
        debug!(lane = %name, rules = topics.len(), "registered output lane");
        self.lanes.push(Lane {
            name,
            topics,
            sender,
        });
    }

    /// Number of registered lanes
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Current counters
    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }

    /// Route one produced frame
    ///
    /// The frame's produced topic is rewritten per matching lane; the frame
    /// is cheap to clone (shared image buffer), so multi-lane fan-out costs
    /// reference bumps. Returns the number of lanes reached.
    pub async fn route(&mut self, frame: Frame) -> usize {
        let topic = frame.topic().to_string();

        let matches: Vec<(usize, String)> = self
            .lanes
            .iter()
            .enumerate()
            .filter_map(|(index, lane)| {
                lane.topics
                    .iter()
                    .find_map(|rule| rule.map(&topic))
                    .map(|dst| (index, dst.to_string()))
            })
            .collect();

        if matches.is_empty() {
            self.stats.frames_unroutable += 1;
            if self.warned_topics.insert(topic.clone()) {
                warn!(
                    topic,
                    "produced topic matches no output rule, dropping (warned once per run)"
                );
            }
            return 0;
        }

        let mut reached = 0;
        for (index, dst) in matches {
            let mut outgoing = frame.clone();
            outgoing.set_topic(&dst);

            self.stats.lane_sends += 1;
            let lane = &self.lanes[index];
            if lane.sender.send(outgoing).await.is_err() {
                self.stats.lane_failures += 1;
                warn!(lane = %lane.name, "output lane closed, dropping frame");
            } else {
                reached += 1;
            }
        }

        if reached > 0 {
            self.stats.frames_routed += 1;
        }
        reached
    }

    /// Route a batch of produced frames in order
    pub async fn route_all(&mut self, frames: Vec<Frame>) -> usize {
        let mut reached = 0;
        for frame in frames {
            reached += self.route(frame).await;
        }
        reached
    }
}
