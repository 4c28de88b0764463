//! Tests for the endpoint DSL parser
//!
//! Covers URI tokenizing, topic mappings, ephemerality markers, options
//! and error positions.

use crate::dsl::{parse_outputs, parse_sources, EphemeralMode, TopicMap};
use crate::error::ConfigError;

// =============================================================================
// Basic parsing
// =============================================================================

#[test]
fn test_plain_wire_source() {
    let sources = parse_sources("tcp://localhost:5550").unwrap();
    assert_eq!(sources.len(), 1);

    let source = &sources[0];
    assert_eq!(source.endpoint.scheme(), "tcp");
    assert_eq!(source.endpoint.host(), "localhost");
    assert_eq!(source.endpoint.port(), Some(5550));
    assert_eq!(source.ephemeral, EphemeralMode::None);
    // Topic 'main' is implicit.
    assert_eq!(source.topics, vec![TopicMap::identity("main")]);
}

#[test]
fn test_scheme_is_case_insensitive() {
    let sources = parse_sources("TCP://localhost:5550").unwrap();
    assert_eq!(sources[0].endpoint.scheme(), "tcp");
    assert!(sources[0].endpoint.is_wire());
}

#[test]
fn test_multiple_endpoints_preserve_order() {
    let sources = parse_sources("tcp://a:1, tcp://b:2,tcp://c:3").unwrap();
    let hosts: Vec<&str> = sources.iter().map(|s| s.endpoint.host()).collect();
    assert_eq!(hosts, vec!["a", "b", "c"]);
}

#[test]
fn test_duplicate_uris_with_different_options_are_distinct() {
    let sources = parse_sources("tcp://a:1!sync=strict,tcp://a:1!sync=loose").unwrap();
    assert_eq!(sources.len(), 2);
    assert_eq!(sources[0].options.get_str("sync"), Some("strict"));
    assert_eq!(sources[1].options.get_str("sync"), Some("loose"));
}

#[test]
fn test_external_scheme_preserved() {
    let sources = parse_sources("rtsp://cam.local:554/stream1?tcp=1").unwrap();
    let endpoint = &sources[0].endpoint;
    assert_eq!(endpoint.scheme(), "rtsp");
    assert!(!endpoint.is_wire());
    assert_eq!(endpoint.path(), Some("/stream1"));
    assert_eq!(endpoint.query(), Some("tcp=1"));
}

// =============================================================================
// Topic mappings
// =============================================================================

#[test]
fn test_topic_remap() {
    let sources = parse_sources("tcp://localhost:5550;plates>main").unwrap();
    assert_eq!(
        sources[0].topics,
        vec![TopicMap {
            src: "plates".into(),
            dst: "main".into()
        }]
    );
    assert_eq!(sources[0].map_topic("plates"), Some("main"));
    assert_eq!(sources[0].map_topic("other"), None);
}

#[test]
fn test_multiple_topic_specs() {
    let sources = parse_sources("tcp://localhost:5550;a;b>c").unwrap();
    assert_eq!(sources[0].topics.len(), 2);
    assert_eq!(sources[0].map_topic("a"), Some("a"));
    assert_eq!(sources[0].map_topic("b"), Some("c"));
}

#[test]
fn test_wildcard_topic() {
    let sources = parse_sources("tcp://localhost:5550;*").unwrap();
    assert!(sources[0].subscribes_all());
    assert_eq!(sources[0].map_topic("anything"), Some("anything"));
}

#[test]
fn test_invalid_topic_name() {
    let result = parse_sources("tcp://localhost:5550;9lives");
    assert!(matches!(result, Err(ConfigError::BadTopic { .. })));
}

#[test]
fn test_wildcard_cannot_be_remapped() {
    let result = parse_sources("tcp://localhost:5550;*>main");
    assert!(result.is_err());
}

// =============================================================================
// Ephemerality
// =============================================================================

#[test]
fn test_ephemeral_marker() {
    let sources = parse_sources("tcp://localhost:5550?").unwrap();
    assert_eq!(sources[0].ephemeral, EphemeralMode::Ephemeral);
    assert_eq!(sources[0].endpoint.port(), Some(5550));
}

#[test]
fn test_doubly_ephemeral_marker() {
    let sources = parse_sources("tcp://localhost:5550??;*").unwrap();
    assert_eq!(sources[0].ephemeral, EphemeralMode::DoublyEphemeral);
    assert!(sources[0].subscribes_all());
}

#[test]
fn test_ephemeral_marker_rejected_on_output() {
    let result = parse_outputs("tcp://*:5550?");
    assert!(matches!(
        result,
        Err(ConfigError::MalformedEndpoint { .. })
    ));
}

// =============================================================================
// Options
// =============================================================================

#[test]
fn test_options_with_and_without_values() {
    let sources = parse_sources("tcp://h:1;main!sync=strict!keepalive!window_ms=500").unwrap();
    let options = &sources[0].options;
    assert_eq!(options.get_str("sync"), Some("strict"));
    assert_eq!(options.get_bool("keepalive").unwrap(), Some(true));
    assert_eq!(options.get_i64("window_ms").unwrap(), Some(500));
}

#[test]
fn test_unknown_options_preserved() {
    let sources = parse_sources("tcp://h:1!shade=dark!flip").unwrap();
    let options = &sources[0].options;
    assert_eq!(options.get_str("shade"), Some("dark"));
    assert!(options.has("flip"));
    let mut unknown = options.unknown_keys();
    unknown.sort();
    assert_eq!(unknown, vec!["flip", "shade"]);
}

#[test]
fn test_recognized_option_type_checked() {
    let result = parse_sources("tcp://h:1!window_ms=soon");
    assert!(matches!(result, Err(ConfigError::InvalidOption { .. })));

    let result = parse_sources("tcp://h:1!sync=sometimes");
    assert!(matches!(result, Err(ConfigError::InvalidOption { .. })));
}

// =============================================================================
// Outputs
// =============================================================================

#[test]
fn test_output_bind_all_interfaces() {
    let outputs = parse_outputs("tcp://*:5550").unwrap();
    assert_eq!(outputs[0].endpoint.host(), "*");
    assert_eq!(outputs[0].endpoint.port(), Some(5550));
}

#[test]
fn test_output_publish_rewrite() {
    let outputs = parse_outputs("tcp://*:5552;detections>main").unwrap();
    assert_eq!(outputs[0].map_topic("detections"), Some("main"));
    assert_eq!(outputs[0].map_topic("main"), None);
}

// =============================================================================
// Errors and positions
// =============================================================================

#[test]
fn test_malformed_uri_reports_position() {
    let result = parse_sources("tcp://a:1,garbage");
    match result {
        Err(ConfigError::MalformedEndpoint { pos, .. }) => assert_eq!(pos, 10),
        other => panic!("expected MalformedEndpoint, got {other:?}"),
    }
}

#[test]
fn test_wire_endpoint_requires_port() {
    let result = parse_sources("tcp://localhost");
    assert!(matches!(
        result,
        Err(ConfigError::MalformedEndpoint { .. })
    ));
}

#[test]
fn test_empty_string_parses_to_no_sources() {
    assert!(parse_sources("").unwrap().is_empty());
    assert!(parse_outputs(" ").unwrap().is_empty());
}
