//! Value coercion - string forms into typed config values
//!
//! All coercions return a `String` reason on failure so callers can wrap it
//! in whichever error field applies.

use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

/// Parse a boolean from its accepted spellings
///
/// Case-insensitive `true/false`, `1/0`, `yes/no`.
pub fn parse_bool(text: &str) -> Result<bool, String> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(format!("'{other}' is not a boolean")),
    }
}

/// Parse an integer, accepting `k` / `M` magnitude suffixes
///
/// Suffixes are decimal: `4k` is 4000, `2M` is 2000000.
pub fn parse_i64(text: &str) -> Result<i64, String> {
    let text = text.trim();
    let (digits, multiplier) = match text.strip_suffix(['k', 'K']) {
        Some(head) => (head, 1_000),
        None => match text.strip_suffix('M') {
            Some(head) => (head, 1_000_000),
            None => (text, 1),
        },
    };
    digits
        .trim()
        .parse::<i64>()
        .map(|n| n * multiplier)
        .map_err(|_| format!("'{text}' is not an integer"))
}

/// Parse a float, accepting `k` / `M` magnitude suffixes
pub fn parse_f64(text: &str) -> Result<f64, String> {
    let text = text.trim();
    let (digits, multiplier) = match text.strip_suffix(['k', 'K']) {
        Some(head) => (head, 1_000.0),
        None => match text.strip_suffix('M') {
            Some(head) => (head, 1_000_000.0),
            None => (text, 1.0),
        },
    };
    digits
        .trim()
        .parse::<f64>()
        .map(|f| f * multiplier)
        .map_err(|_| format!("'{text}' is not a number"))
}

/// Case-insensitive match against declared enum variants
///
/// Returns the index of the matching variant.
pub fn parse_enum_index(text: &str, variants: &[&str]) -> Result<usize, String> {
    let needle = text.trim();
    variants
        .iter()
        .position(|v| v.eq_ignore_ascii_case(needle))
        .ok_or_else(|| format!("'{needle}' is not one of: {}", variants.join(", ")))
}

/// Split a comma-separated list, trimming each element
///
/// Empty elements are dropped.
pub fn parse_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a duration from `[[[days:]hours:]minutes:]seconds[.subsecs]`
///
/// A plain number is seconds. Each colon-separated field is multiplied up
/// one unit, so `1:30` is ninety seconds and `1:00:00:00` is one day.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    let fields: Vec<&str> = text.split(':').collect();
    if fields.len() > 4 {
        return Err(format!("'{text}' has too many ':' fields"));
    }

    const MULTIPLIERS: [f64; 4] = [1.0, 60.0, 3600.0, 86_400.0];
    let mut total = 0.0f64;
    for (i, field) in fields.iter().rev().enumerate() {
        let value = field
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("'{text}' is not a duration"))?;
        if value < 0.0 {
            return Err(format!("'{text}' is negative"));
        }
        total += value * MULTIPLIERS[i];
    }
    Ok(Duration::from_secs_f64(total))
}

/// Parse an absolute deadline from date, time, or datetime text
///
/// Accepted forms, naive ones interpreted in the local timezone:
/// - RFC 3339 (`2026-08-02T17:00:00Z`)
/// - `YYYY-MM-DD HH:MM[:SS]` (a `T` separator also works)
/// - `YYYY-MM-DD` — midnight starting that date
/// - `HH:MM[:SS]` — the next occurrence of that wall-clock time
pub fn parse_deadline(text: &str) -> Result<DateTime<Utc>, String> {
    let text = text.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return local_to_utc(naive);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        let naive = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| format!("'{text}' is not a valid date"))?;
        return local_to_utc(naive);
    }
    for format in ["%H:%M:%S", "%H:%M"] {
        if let Ok(time) = NaiveTime::parse_from_str(text, format) {
            let now = Local::now();
            let mut naive = now.date_naive().and_time(time);
            // A time already behind us means the same time tomorrow.
            if naive <= now.naive_local() {
                naive += chrono::Duration::days(1);
            }
            return local_to_utc(naive);
        }
    }
    Err(format!("'{text}' is not a date, time or datetime"))
}

fn local_to_utc(naive: NaiveDateTime) -> Result<DateTime<Utc>, String> {
    match Local.from_local_datetime(&naive) {
        chrono::LocalResult::Single(local) => Ok(local.with_timezone(&Utc)),
        // DST fold: take the earlier instant.
        chrono::LocalResult::Ambiguous(earlier, _) => Ok(earlier.with_timezone(&Utc)),
        chrono::LocalResult::None => {
            Err(format!("'{naive}' does not exist in the local timezone"))
        }
    }
}
