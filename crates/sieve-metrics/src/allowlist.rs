//! Allowlist - the gate every metric export passes through
//!
//! A process-wide set of name patterns with `*` wildcards. Metrics not
//! matching any pattern are dropped at export time with one warning per
//! distinct name. An empty allowlist exports nothing: lock-down is the
//! default posture.

use std::collections::HashSet;
use std::env;
use std::path::Path;

use parking_lot::Mutex;
use tracing::warn;

use crate::error::TelemetryError;
use crate::Result;

/// Environment variable carrying comma-separated patterns
pub const SAFE_METRICS_ENV: &str = "SAFE_METRICS";

/// Environment variable pointing at the allowlist file
pub const SAFE_METRICS_FILE_ENV: &str = "SAFE_METRICS_FILE";

/// Metric name patterns permitted to leave the process
#[derive(Debug, Default)]
pub struct Allowlist {
    patterns: Vec<String>,
    warned: Mutex<HashSet<String>>,
}

impl Allowlist {
    /// An allowlist from explicit patterns
    pub fn new(patterns: Vec<String>) -> Self {
        Self {
            patterns,
            warned: Mutex::new(HashSet::new()),
        }
    }

    /// The empty allowlist: everything is blocked
    pub fn locked_down() -> Self {
        Self::default()
    }

    /// Read the allowlist from the environment
    ///
    /// `SAFE_METRICS_FILE` wins over `SAFE_METRICS`; with neither set the
    /// result is the locked-down empty list.
    pub fn from_env() -> Self {
        if let Ok(path) = env::var(SAFE_METRICS_FILE_ENV) {
            match Self::from_file(Path::new(&path)) {
                Ok(list) => return list,
                Err(e) => {
                    warn!(path, error = %e, "failed to read allowlist file, locking down");
                    return Self::locked_down();
                }
            }
        }
        if let Ok(csv) = env::var(SAFE_METRICS_ENV) {
            let patterns = csv
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            return Self::new(patterns);
        }
        Self::locked_down()
    }

    /// Read the allowlist from a YAML file
    ///
    /// Only the flat-list shape is understood:
    ///
    /// ```yaml
    /// safe_metrics:
    ///   - frames_total
    ///   - plate_*
    /// ```
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| TelemetryError::Allowlist(format!("{}: {e}", path.display())))?;
        Self::parse(&text)
    }

    /// Parse the flat-list YAML shape
    pub fn parse(text: &str) -> Result<Self> {
        let mut patterns = Vec::new();
        let mut in_list = false;

        for raw in text.lines() {
            let line = raw.split('#').next().unwrap_or("").trim_end();
            let trimmed = line.trim_start();
            if trimmed.is_empty() {
                continue;
            }

            if let Some(rest) = trimmed.strip_prefix("safe_metrics:") {
                in_list = true;
                // Inline list form: safe_metrics: [a, b]
                let rest = rest.trim();
                if let Some(inline) = rest.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                    for item in inline.split(',') {
                        let item = item.trim().trim_matches(['"', '\'']);
                        if !item.is_empty() {
                            patterns.push(item.to_string());
                        }
                    }
                    in_list = false;
                }
                continue;
            }

            if in_list {
                if let Some(item) = trimmed.strip_prefix("- ") {
                    let item = item.trim().trim_matches(['"', '\'']);
                    if !item.is_empty() {
                        patterns.push(item.to_string());
                    }
                } else if !trimmed.starts_with('-') {
                    // A new top-level key ends the list.
                    in_list = false;
                }
            }
        }

        Ok(Self::new(patterns))
    }

    /// The configured patterns
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// True if the list blocks everything
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// True if the name matches at least one pattern
    pub fn allows(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| glob_match(p, name))
    }

    /// Gate one export; blocked names warn once per run
    pub fn check(&self, name: &str) -> bool {
        if self.allows(name) {
            return true;
        }
        if self.warned.lock().insert(name.to_string()) {
            warn!(metric = name, "metric blocked by allowlist");
        }
        false
    }
}

/// Match `name` against a pattern with `*` wildcards
///
/// Iterative two-pointer match; `*` spans any run of characters.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();

    let (mut pi, mut ni) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ni < n.len() {
        if pi < p.len() && (p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ni));
            pi += 1;
        } else if let Some((star_pi, star_ni)) = star {
            // Backtrack: let the last star swallow one more character.
            pi = star_pi + 1;
            ni = star_ni + 1;
            star = Some((star_pi, star_ni + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
