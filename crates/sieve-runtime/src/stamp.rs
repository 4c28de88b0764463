//! Runtime metadata stamping
//!
//! Outgoing frames get the reserved `meta` fields: per-topic sequence
//! `id`, wall-clock `ts`, producing `src`, smoothed `fps` and the tick's
//! input/output latencies in milliseconds.

use std::collections::HashMap;
use std::time::Instant;

use sieve_protocol::Frame;

/// Exponential smoothing factor for the fps figure
const FPS_ALPHA: f64 = 0.1;

/// Tracks tick cadence and assigns per-topic sequence numbers
#[derive(Debug, Default)]
pub struct Pacer {
    last_tick: Option<Instant>,
    fps: f64,
    sequence: HashMap<String, i64>,
}

impl Pacer {
    /// A fresh pacer
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a tick boundary, updating the smoothed fps
    pub fn tick(&mut self) -> f64 {
        let now = Instant::now();
        if let Some(last) = self.last_tick {
            let dt = now.duration_since(last).as_secs_f64();
            if dt > 0.0 {
                let instant_fps = 1.0 / dt;
                self.fps = if self.fps == 0.0 {
                    instant_fps
                } else {
                    FPS_ALPHA * instant_fps + (1.0 - FPS_ALPHA) * self.fps
                };
            }
        }
        self.last_tick = Some(now);
        self.fps
    }

    /// Smoothed frames per second
    #[inline]
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Next sequence number for a topic (starts at 1, strictly increasing)
    pub fn next_id(&mut self, topic: &str) -> i64 {
        let counter = self.sequence.entry(topic.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }
}

/// Current wall time in nanoseconds since epoch, UTC
pub fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

/// Milliseconds between the newest input frame's `ts` and now
///
/// Wall clocks can disagree across hosts; a negative difference clamps to
/// zero rather than reordering anything.
pub fn input_latency_ms(newest_input_ts: Option<i64>, now: i64) -> Option<f64> {
    let ts = newest_input_ts?;
    Some(((now - ts).max(0)) as f64 / 1_000_000.0)
}

/// Stamp the reserved runtime fields onto one outgoing frame
#[allow(clippy::too_many_arguments)]
pub fn stamp_outgoing(
    frame: &mut Frame,
    pacer: &mut Pacer,
    src: &str,
    ts: i64,
    fps: f64,
    lat_in: Option<f64>,
    lat_out: f64,
) {
    let topic = frame.topic().to_string();
    let id = pacer.next_id(&topic);
    frame.set_meta_field("id", id);
    frame.set_meta_field("ts", ts);
    frame.set_meta_field("src", src);
    frame.set_meta_field("topic", topic.as_str());
    frame.set_meta_field("fps", fps);
    if let Some(lat_in) = lat_in {
        frame.set_meta_field("lat_in", lat_in);
    }
    frame.set_meta_field("lat_out", lat_out);
}
