//! Tests for value coercions

use std::time::Duration;

use chrono::{TimeZone, Utc};

use crate::coerce::{
    parse_bool, parse_deadline, parse_duration, parse_enum_index, parse_f64, parse_i64, parse_list,
};

// =============================================================================
// Booleans
// =============================================================================

#[test]
fn test_bool_spellings() {
    for text in ["true", "TRUE", "1", "yes", "Yes"] {
        assert_eq!(parse_bool(text), Ok(true), "{text}");
    }
    for text in ["false", "False", "0", "no", "NO"] {
        assert_eq!(parse_bool(text), Ok(false), "{text}");
    }
    assert!(parse_bool("on").is_err());
}

// =============================================================================
// Numbers
// =============================================================================

#[test]
fn test_int_with_magnitude_suffix() {
    assert_eq!(parse_i64("42"), Ok(42));
    assert_eq!(parse_i64("4k"), Ok(4_000));
    assert_eq!(parse_i64("4K"), Ok(4_000));
    assert_eq!(parse_i64("2M"), Ok(2_000_000));
    assert_eq!(parse_i64("-3"), Ok(-3));
    assert!(parse_i64("4.5").is_err());
    assert!(parse_i64("fast").is_err());
}

#[test]
fn test_float_with_magnitude_suffix() {
    assert_eq!(parse_f64("2.5"), Ok(2.5));
    assert_eq!(parse_f64("1.5M"), Ok(1_500_000.0));
    assert_eq!(parse_f64("0.5k"), Ok(500.0));
    assert!(parse_f64("fast").is_err());
}

// =============================================================================
// Enums and lists
// =============================================================================

#[test]
fn test_enum_case_insensitive() {
    let variants = &["loose", "strict", "by_id"];
    assert_eq!(parse_enum_index("STRICT", variants), Ok(1));
    assert_eq!(parse_enum_index("by_id", variants), Ok(2));
    assert!(parse_enum_index("tight", variants).is_err());
}

#[test]
fn test_list_trims_and_drops_empties() {
    assert_eq!(parse_list("a, b ,c,,"), vec!["a", "b", "c"]);
    assert!(parse_list("").is_empty());
}

// =============================================================================
// Durations
// =============================================================================

#[test]
fn test_duration_plain_seconds() {
    assert_eq!(parse_duration("90"), Ok(Duration::from_secs(90)));
    assert_eq!(parse_duration("1.5"), Ok(Duration::from_millis(1500)));
}

#[test]
fn test_duration_colon_fields() {
    assert_eq!(parse_duration("1:30"), Ok(Duration::from_secs(90)));
    assert_eq!(parse_duration("2:00:00"), Ok(Duration::from_secs(7200)));
    assert_eq!(
        parse_duration("1:00:00:00"),
        Ok(Duration::from_secs(86_400))
    );
}

#[test]
fn test_duration_rejects_garbage() {
    assert!(parse_duration("soon").is_err());
    assert!(parse_duration("1:2:3:4:5").is_err());
    assert!(parse_duration("-5").is_err());
}

// =============================================================================
// Deadlines
// =============================================================================

#[test]
fn test_deadline_rfc3339() {
    let when = parse_deadline("2100-01-06T12:30:00Z").unwrap();
    assert_eq!(when, Utc.with_ymd_and_hms(2100, 1, 6, 12, 30, 0).unwrap());
}

#[test]
fn test_deadline_naive_datetime() {
    // Naive forms resolve in the local timezone; pin only what holds
    // everywhere.
    let when = parse_deadline("2100-01-06 12:30:00").unwrap();
    assert!(when > Utc::now());

    // The T separator and the minutes-only form land on the same instant.
    assert_eq!(parse_deadline("2100-01-06T12:30").unwrap(), when);
}

#[test]
fn test_deadline_date_only_is_midnight() {
    let midnight = parse_deadline("2100-01-06").unwrap();
    let later = parse_deadline("2100-01-06 00:00:01").unwrap();
    assert_eq!(later - midnight, chrono::Duration::seconds(1));
}

#[test]
fn test_deadline_time_only_is_next_occurrence() {
    let when = parse_deadline("12:30:00").unwrap();
    let now = Utc::now();
    assert!(when > now);
    assert!(when - now <= chrono::Duration::days(1) + chrono::Duration::minutes(1));
}

#[test]
fn test_deadline_rejects_garbage() {
    assert!(parse_deadline("whenever").is_err());
    assert!(parse_deadline("2100-13-40").is_err());
    assert!(parse_deadline("").is_err());
}
