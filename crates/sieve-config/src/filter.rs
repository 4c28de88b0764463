//! Typed filter configuration
//!
//! `FilterConfig::normalize` resolves defaults, environment overlay, the
//! user-supplied map and per-endpoint option overrides into a frozen
//! config. Precedence is increasing in that order.

use std::env;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sieve_protocol::{Data, DataMap};
use tracing::warn;

use crate::coerce;
use crate::dsl::{self, EphemeralMode, Output, Source};
use crate::error::ConfigError;
use crate::Result;

/// User-facing config values are frame metadata values
pub type ConfigValue = Data;

/// Synchronization mode for assembling ticks from multiple topics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Deliver as soon as any topic has a frame; missing topics are `None`
    #[default]
    Loose,
    /// Deliver only when every non-ephemeral topic has a frame
    Strict,
    /// Align frames across topics by `meta.id`
    ById,
}

impl SyncMode {
    const VARIANTS: &'static [&'static str] = &["loose", "strict", "by_id"];

    /// Parse a mode name, case-insensitive
    pub fn parse(text: &str) -> Result<Self> {
        let index = coerce::parse_enum_index(text, Self::VARIANTS)
            .map_err(|reason| ConfigError::invalid_field("sync", reason))?;
        Ok(match index {
            0 => SyncMode::Loose,
            1 => SyncMode::Strict,
            _ => SyncMode::ById,
        })
    }
}

/// When a filter stops itself
///
/// The config form is either a duration (`90`, `1:30`, `1:00:00:00`) or an
/// `@`-prefixed absolute deadline (`@2026-08-02 17:00:00`, `@17:00`,
/// `@2026-08-03`).
#[derive(Debug, Clone, PartialEq)]
pub enum ExitAfter {
    /// Relative: this long after entering `Running`
    Elapsed(Duration),
    /// Absolute: at this wall-clock instant
    At(DateTime<Utc>),
}

impl ExitAfter {
    /// Parse the config form
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if let Some(deadline) = text.strip_prefix('@') {
            let when = coerce::parse_deadline(deadline)
                .map_err(|reason| ConfigError::invalid_field("exit_after", reason))?;
            return Ok(ExitAfter::At(when));
        }
        let after = coerce::parse_duration(text)
            .map_err(|reason| ConfigError::invalid_field("exit_after", reason))?;
        Ok(ExitAfter::Elapsed(after))
    }

    /// Time left measured from `now`; zero once an absolute deadline has
    /// already passed
    pub fn remaining_from(&self, now: DateTime<Utc>) -> Duration {
        match self {
            ExitAfter::Elapsed(duration) => *duration,
            ExitAfter::At(when) => (*when - now).to_std().unwrap_or(Duration::ZERO),
        }
    }
}

/// Frame traffic logging on sources and outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameLogMode {
    /// No per-frame logging
    #[default]
    None,
    /// One line per frame: topic, id, shape
    Basic,
    /// Basic plus metadata key listing
    Pretty,
}

impl FrameLogMode {
    const VARIANTS: &'static [&'static str] = &["none", "basic", "pretty"];

    /// Parse a mode name, case-insensitive
    pub fn parse(text: &str) -> Result<Self> {
        let index = coerce::parse_enum_index(text, Self::VARIANTS)
            .map_err(|reason| ConfigError::invalid_field("log_frames", reason))?;
        Ok(match index {
            0 => FrameLogMode::None,
            1 => FrameLogMode::Basic,
            _ => FrameLogMode::Pretty,
        })
    }
}

/// Config field names the runtime owns; anything else in the user map is
/// unknown (warned, or rejected under `strict`).
const KNOWN_FIELDS: &[&str] = &[
    "id",
    "sources",
    "outputs",
    "sync",
    "sync_window_ms",
    "exit_after",
    "propagate_exit",
    "obey_exit",
    "stop_exit",
    "propagate_eos",
    "drain_deadline_s",
    "metrics_interval_s",
    "log_frames",
    "strict",
];

/// A fully resolved filter configuration
///
/// Construct through [`FilterConfig::normalize`]; the struct is plain data
/// and treated as frozen afterwards.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Filter instance id, unique within a run
    pub id: String,
    /// Filter kind name the config was normalized for
    pub kind: String,
    /// Parsed inbound endpoints, in declaration order
    pub sources: Vec<Source>,
    /// Parsed outbound endpoints, in declaration order
    pub outputs: Vec<Output>,
    /// Default synchronization mode (per-source `sync` options override)
    pub sync: SyncMode,
    /// Orphan window for by-id alignment
    pub sync_window: Duration,
    /// Stop the filter cleanly after a duration or at an absolute deadline
    pub exit_after: Option<ExitAfter>,
    /// On exit, send stop to siblings that obey
    pub propagate_exit: bool,
    /// Accept stop propagated from exiting siblings
    pub obey_exit: bool,
    /// Count toward the launcher's done-quorum
    pub stop_exit: bool,
    /// Exit when every source has reported end-of-stream
    pub propagate_eos: bool,
    /// Hard deadline for draining in-flight frames on stop
    pub drain_deadline: Duration,
    /// Aggregation export interval
    pub metrics_interval: Duration,
    /// Default frame traffic logging (per-endpoint `log` options override)
    pub log_frames: FrameLogMode,
    /// Reject unknown config keys instead of warning
    pub strict: bool,
}

impl FilterConfig {
    /// Resolve a config for `kind` from the user-supplied map
    ///
    /// Overlay order (increasing precedence): built-in defaults,
    /// `FILTER_<FIELD>` environment, `<KIND>_<FIELD>` environment, the user
    /// map. Endpoint options parsed out of the DSL override per endpoint at
    /// use sites via [`FilterConfig::source_sync`] and friends.
    pub fn normalize(kind: &str, user: &DataMap) -> Result<FilterConfig> {
        let resolver = Resolver::new(kind, user);

        let strict = resolver.get_bool("strict")?.unwrap_or(false);
        for key in user.keys() {
            if !KNOWN_FIELDS.contains(&key) {
                if strict {
                    return Err(ConfigError::UnknownField {
                        field: key.to_string(),
                    });
                }
                warn!(field = key, kind, "ignoring unknown config field");
            }
        }

        let id = resolver
            .get_string("id")?
            .unwrap_or_else(|| kind.to_ascii_lowercase());

        let sources = match resolver.value("sources") {
            None => Vec::new(),
            Some(Data::Str(text)) => dsl::parse_sources(&text)?,
            Some(Data::List(items)) => {
                let strings = list_of_strings("sources", &items)?;
                dsl::parse_sources_list(&strings)?
            }
            Some(other) => {
                return Err(ConfigError::invalid_field(
                    "sources",
                    format!("expected string or list, got {other:?}"),
                ))
            }
        };

        let outputs = match resolver.value("outputs") {
            None => Vec::new(),
            Some(Data::Str(text)) => dsl::parse_outputs(&text)?,
            Some(Data::List(items)) => {
                let strings = list_of_strings("outputs", &items)?;
                dsl::parse_outputs_list(&strings)?
            }
            Some(other) => {
                return Err(ConfigError::invalid_field(
                    "outputs",
                    format!("expected string or list, got {other:?}"),
                ))
            }
        };

        let sync = match resolver.get_string("sync")? {
            Some(text) => SyncMode::parse(&text)?,
            None => SyncMode::default(),
        };

        let sync_window = resolver
            .get_i64("sync_window_ms")?
            .map(|ms| Duration::from_millis(ms.max(0) as u64))
            .unwrap_or(Duration::from_secs(2));

        let exit_after = match resolver.get_string("exit_after")? {
            Some(text) => Some(ExitAfter::parse(&text)?),
            None => None,
        };

        let log_frames = match resolver.get_string("log_frames")? {
            Some(text) => FrameLogMode::parse(&text)?,
            None => FrameLogMode::default(),
        };

        Ok(FilterConfig {
            id,
            kind: kind.to_string(),
            sources,
            outputs,
            sync,
            sync_window,
            exit_after,
            propagate_exit: resolver.get_bool("propagate_exit")?.unwrap_or(true),
            obey_exit: resolver.get_bool("obey_exit")?.unwrap_or(true),
            stop_exit: resolver.get_bool("stop_exit")?.unwrap_or(false),
            propagate_eos: resolver.get_bool("propagate_eos")?.unwrap_or(true),
            drain_deadline: resolver
                .get_i64("drain_deadline_s")?
                .map(|s| Duration::from_secs(s.max(0) as u64))
                .unwrap_or(Duration::from_secs(10)),
            metrics_interval: resolver
                .get_i64("metrics_interval_s")?
                .map(|s| Duration::from_secs(s.max(1) as u64))
                .unwrap_or(Duration::from_secs(10)),
            log_frames,
            strict,
        })
    }

    /// Effective sync mode for one source: its `sync` option, else the
    /// config default
    pub fn source_sync(&self, source: &Source) -> SyncMode {
        match source.options.get_str("sync") {
            Some(text) => SyncMode::parse(text).unwrap_or(self.sync),
            None => self.sync,
        }
    }

    /// Effective by-id window for one source
    pub fn source_window(&self, source: &Source) -> Duration {
        match source.options.get_i64("window_ms") {
            Ok(Some(ms)) => Duration::from_millis(ms.max(0) as u64),
            _ => self.sync_window,
        }
    }

    /// Effective frame logging for one endpoint's options
    pub fn endpoint_log(&self, options: &crate::dsl::EndpointOptions) -> FrameLogMode {
        match options.get_str("log") {
            Some(text) => FrameLogMode::parse(text).unwrap_or(self.log_frames),
            None => {
                if options.has("log") {
                    FrameLogMode::Basic
                } else {
                    self.log_frames
                }
            }
        }
    }

    /// True if any source is non-ephemeral
    pub fn has_durable_sources(&self) -> bool {
        self.sources
            .iter()
            .any(|s| s.ephemeral == EphemeralMode::None)
    }
}

fn list_of_strings(field: &str, items: &[Data]) -> Result<Vec<String>> {
    items
        .iter()
        .map(|item| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                ConfigError::invalid_field(field, "list elements must be strings")
            })
        })
        .collect()
}

/// Field resolution against the user map and environment overlay
struct Resolver<'a> {
    user: &'a DataMap,
    kind_prefix: String,
}

impl<'a> Resolver<'a> {
    fn new(kind: &str, user: &'a DataMap) -> Self {
        let kind_prefix: String = kind
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        Self { user, kind_prefix }
    }

    /// The effective raw value for a field, if any
    fn value(&self, field: &str) -> Option<Data> {
        if let Some(value) = self.user.get(field) {
            return Some(value.clone());
        }
        let upper = field.to_ascii_uppercase();
        for prefix in [self.kind_prefix.as_str(), "FILTER"] {
            if let Ok(text) = env::var(format!("{prefix}_{upper}")) {
                return Some(Data::Str(text));
            }
        }
        None
    }

    fn get_string(&self, field: &str) -> Result<Option<String>> {
        match self.value(field) {
            None => Ok(None),
            Some(Data::Str(s)) => Ok(Some(s)),
            Some(other) => Err(ConfigError::invalid_field(
                field,
                format!("expected string, got {other:?}"),
            )),
        }
    }

    fn get_bool(&self, field: &str) -> Result<Option<bool>> {
        match self.value(field) {
            None => Ok(None),
            Some(Data::Bool(b)) => Ok(Some(b)),
            Some(Data::Str(s)) => coerce::parse_bool(&s)
                .map(Some)
                .map_err(|reason| ConfigError::invalid_field(field, reason)),
            Some(other) => Err(ConfigError::invalid_field(
                field,
                format!("expected boolean, got {other:?}"),
            )),
        }
    }

    fn get_i64(&self, field: &str) -> Result<Option<i64>> {
        match self.value(field) {
            None => Ok(None),
            Some(Data::Int(n)) => Ok(Some(n)),
            Some(Data::Float(f)) => Ok(Some(f as i64)),
            Some(Data::Str(s)) => coerce::parse_i64(&s)
                .map(Some)
                .map_err(|reason| ConfigError::invalid_field(field, reason)),
            Some(other) => Err(ConfigError::invalid_field(
                field,
                format!("expected integer, got {other:?}"),
            )),
        }
    }
}
