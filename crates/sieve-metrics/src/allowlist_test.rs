//! Tests for allowlist parsing and glob matching

use std::io::Write;

use crate::allowlist::{glob_match, Allowlist};

// =============================================================================
// Glob matching
// =============================================================================

#[test]
fn test_exact_match() {
    assert!(glob_match("frames_total", "frames_total"));
    assert!(!glob_match("frames_total", "frames"));
    assert!(!glob_match("frames", "frames_total"));
}

#[test]
fn test_trailing_star() {
    assert!(glob_match("foo_*", "foo_counter"));
    assert!(glob_match("foo_*", "foo_"));
    assert!(!glob_match("foo_*", "bar_counter"));
}

#[test]
fn test_leading_and_inner_star() {
    assert!(glob_match("*_total", "frames_total"));
    assert!(glob_match("plate_*_ms", "plate_decode_ms"));
    assert!(!glob_match("plate_*_ms", "plate_decode"));
}

#[test]
fn test_star_matches_everything() {
    assert!(glob_match("*", "anything"));
    assert!(glob_match("*", ""));
}

// =============================================================================
// Allowlist behavior
// =============================================================================

#[test]
fn test_empty_allowlist_blocks_everything() {
    let list = Allowlist::locked_down();
    assert!(!list.allows("frames_total"));
    assert!(!list.check("frames_total"));
}

#[test]
fn test_patterns_gate_names() {
    let list = Allowlist::new(vec!["foo_*".into(), "frames_total".into()]);
    assert!(list.allows("foo_counter"));
    assert!(list.allows("frames_total"));
    assert!(!list.allows("bar_histogram"));
}

#[test]
fn test_check_warns_once_per_name() {
    // The warning dedup is per name; check() keeps returning false.
    let list = Allowlist::new(vec!["allowed".into()]);
    assert!(!list.check("blocked"));
    assert!(!list.check("blocked"));
    assert!(list.check("allowed"));
}

// =============================================================================
// File parsing
// =============================================================================

#[test]
fn test_parse_block_list() {
    let text = "
# production allowlist
safe_metrics:
  - frames_total
  - plate_*   # plate pipeline
  - 'quoted_name'
";
    let list = Allowlist::parse(text).unwrap();
    assert_eq!(list.patterns(), &["frames_total", "plate_*", "quoted_name"]);
}

#[test]
fn test_parse_inline_list() {
    let list = Allowlist::parse("safe_metrics: [a, b_*]").unwrap();
    assert_eq!(list.patterns(), &["a", "b_*"]);
}

#[test]
fn test_parse_stops_at_next_key() {
    let text = "
safe_metrics:
  - one
other_key:
  - two
";
    let list = Allowlist::parse(text).unwrap();
    assert_eq!(list.patterns(), &["one"]);
}

#[test]
fn test_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "safe_metrics:\n  - fps\n  - cpu_*").unwrap();

    let list = Allowlist::from_file(file.path()).unwrap();
    assert!(list.allows("fps"));
    assert!(list.allows("cpu_percent"));
    assert!(!list.allows("memory"));
}

#[test]
fn test_missing_file_errors() {
    let result = Allowlist::from_file(std::path::Path::new("/nonexistent/allowlist.yaml"));
    assert!(result.is_err());
}
