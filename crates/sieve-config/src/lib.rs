//! Sieve Configuration
//!
//! Endpoint DSL parsing and typed filter configuration.
//!
//! # Endpoint DSL
//!
//! Sources and outputs are declared as comma-separated endpoint strings:
//!
//! ```text
//! tcp://localhost:5550                      plain wire endpoint
//! tcp://localhost:5550?                     ephemeral consumer
//! tcp://localhost:5550??                    doubly ephemeral consumer
//! tcp://localhost:5550;plates>main          topic remap
//! tcp://localhost:5550;*                    all topics
//! tcp://localhost:5550!sync=strict!log      per-endpoint options
//! ```
//!
//! # Configuration precedence
//!
//! `FilterConfig::normalize` resolves, in order of increasing precedence:
//! defaults, environment (`FILTER_*`, then `<KIND>_*`), the user-supplied
//! map, and per-endpoint option overrides parsed from the DSL. The result
//! is a fully resolved, frozen config.

mod coerce;
mod dsl;
mod error;
mod filter;

pub use coerce::{
    parse_bool, parse_deadline, parse_duration, parse_enum_index, parse_f64, parse_i64, parse_list,
};
pub use dsl::{
    is_valid_topic, parse_outputs, parse_outputs_list, parse_sources, parse_sources_list,
    EndpointOptions, EndpointUri, EphemeralMode, Output, Source, TopicMap, WILDCARD_TOPIC,
};
pub use error::ConfigError;
pub use filter::{ConfigValue, ExitAfter, FilterConfig, FrameLogMode, SyncMode};

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

// Test modules - only compiled during testing
#[cfg(test)]
mod coerce_test;
#[cfg(test)]
mod dsl_test;
