//! System metrics sampler
//!
//! CPU and memory are sampled by the supervisor on the metrics interval
//! and recorded as system gauges; fps and latency gauges come from the
//! tick loop. Everything flows through the same allowlist as user metrics.

use sysinfo::System;

/// One sampler reading
#[derive(Debug, Clone, Copy)]
pub struct SystemSample {
    /// Process-wide CPU utilisation, percent
    pub cpu_percent: f64,
    /// Used memory, bytes
    pub memory_bytes: u64,
}

/// Wraps the sysinfo handle so refreshes stay incremental
pub struct SystemSampler {
    system: System,
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemSampler {
    /// Create a sampler
    pub fn new() -> Self {
        Self {
            system: System::new_all(),
        }
    }

    /// Refresh and read CPU / memory
    pub fn sample(&mut self) -> SystemSample {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
        SystemSample {
            cpu_percent: f64::from(self.system.global_cpu_usage()),
            memory_bytes: self.system.used_memory(),
        }
    }
}
