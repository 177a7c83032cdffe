//! Engine configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::fx::FxConfig;
use crate::inference::DEFAULT_BENCHMARK_RUNS;
use crate::monitor::DEFAULT_SIDETONE_CAPACITY;
use crate::stability::{Precision, DEFAULT_RESTORE_AFTER_PACKETS};
use crate::types::{DEFAULT_REGION_BYTES, SAMPLE_SIZE};

/// Top-level engine configuration (`engine.yaml`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Shared region size in bytes (multiple of 4)
    pub region_bytes: usize,
    pub latency: LatencyConfig,
    pub realtime: RealtimeConfig,
    /// Precision used while degraded (`half` or `reduced`)
    pub degraded_precision: Precision,
    pub fx: FxConfig,
    /// Sidetone ring capacity in samples
    pub sidetone_capacity: usize,
    /// Model loaded at startup
    pub default_model: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            region_bytes: DEFAULT_REGION_BYTES,
            latency: LatencyConfig::default(),
            realtime: RealtimeConfig::default(),
            degraded_precision: Precision::Half,
            fx: FxConfig::default(),
            sidetone_capacity: DEFAULT_SIDETONE_CAPACITY,
            default_model: None,
        }
    }
}

impl EngineConfig {
    /// Repair values the engine cannot run with, logging each change.
    ///
    /// Returns the number of fields that were adjusted.
    pub fn sanitize(&mut self) -> usize {
        let mut fixed = 0;

        if self.region_bytes == 0 || self.region_bytes % SAMPLE_SIZE != 0 {
            log::warn!(
                "[CONFIG] region_bytes {} is not a non-zero multiple of {}, using {}",
                self.region_bytes,
                SAMPLE_SIZE,
                DEFAULT_REGION_BYTES
            );
            self.region_bytes = DEFAULT_REGION_BYTES;
            fixed += 1;
        }

        let latency = &mut self.latency;
        if latency.budget_ms == 0 {
            log::warn!("[CONFIG] latency.budget_ms is 0, using 20");
            latency.budget_ms = 20;
            fixed += 1;
        }
        if latency.fatal_ms < latency.budget_ms {
            log::warn!(
                "[CONFIG] latency.fatal_ms {} is below budget_ms {}, raising it",
                latency.fatal_ms,
                latency.budget_ms
            );
            latency.fatal_ms = latency.budget_ms;
            fixed += 1;
        }
        if latency.restore_after_packets == 0 {
            log::warn!("[CONFIG] latency.restore_after_packets is 0, using 1");
            latency.restore_after_packets = 1;
            fixed += 1;
        }
        if latency.benchmark_runs == 0 {
            log::warn!("[CONFIG] latency.benchmark_runs is 0, using 1");
            latency.benchmark_runs = 1;
            fixed += 1;
        }

        if self.degraded_precision == Precision::Full {
            log::warn!("[CONFIG] degraded_precision cannot be full, using half");
            self.degraded_precision = Precision::Half;
            fixed += 1;
        }
        if self.sidetone_capacity == 0 {
            log::warn!(
                "[CONFIG] sidetone_capacity is 0, using {}",
                DEFAULT_SIDETONE_CAPACITY
            );
            self.sidetone_capacity = DEFAULT_SIDETONE_CAPACITY;
            fixed += 1;
        }
        fixed
    }
}

/// Latency thresholds and watchdog timing, all in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyConfig {
    /// Per-packet target; in-budget packets count toward restore
    pub budget_ms: u64,
    /// Above this a packet forces degradation
    pub fatal_ms: u64,
    /// Delegates slower than this are not eligible (CPU excepted)
    pub benchmark_cutoff_ms: u64,
    /// Watchdog poll interval
    pub poll_interval_ms: u64,
    /// Consecutive in-budget packets required to restore
    pub restore_after_packets: u32,
    /// Timed passes per delegate benchmark
    pub benchmark_runs: usize,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            budget_ms: 20,
            fatal_ms: 30,
            benchmark_cutoff_ms: 20,
            poll_interval_ms: 10,
            restore_after_packets: DEFAULT_RESTORE_AFTER_PACKETS,
            benchmark_runs: DEFAULT_BENCHMARK_RUNS,
        }
    }
}

impl LatencyConfig {
    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.budget_ms)
    }

    pub fn fatal(&self) -> Duration {
        Duration::from_millis(self.fatal_ms)
    }

    pub fn benchmark_cutoff(&self) -> Duration {
        Duration::from_millis(self.benchmark_cutoff_ms)
    }

    /// Poll interval, at least 1 ms
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Real-time scheduling and memory locking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Elevate the thread delivering the first packet to SCHED_FIFO
    pub elevate_priority: bool,
    /// mlock the shared region
    pub pin_memory: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            elevate_priority: true,
            pin_memory: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.region_bytes, 65536);
        assert_eq!(config.latency.budget(), Duration::from_millis(20));
        assert_eq!(config.latency.fatal(), Duration::from_millis(30));
        assert_eq!(config.latency.benchmark_cutoff(), Duration::from_millis(20));
        assert_eq!(config.latency.poll_interval(), Duration::from_millis(10));
        assert_eq!(config.latency.restore_after_packets, 50);
        assert_eq!(config.degraded_precision, Precision::Half);
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = "latency:\n  fatal_ms: 40\ndegraded_precision: reduced\n";
        let config: EngineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.latency.fatal_ms, 40);
        assert_eq!(config.latency.budget_ms, 20);
        assert_eq!(config.degraded_precision, Precision::Reduced);
        assert_eq!(config.region_bytes, 65536);
    }

    #[test]
    fn test_defaults_need_no_repair() {
        assert_eq!(EngineConfig::default().sanitize(), 0);
    }

    #[test]
    fn test_sanitize_repairs_unusable_values() {
        let mut config = EngineConfig {
            region_bytes: 1023,
            degraded_precision: Precision::Full,
            sidetone_capacity: 0,
            ..Default::default()
        };
        config.latency.budget_ms = 25;
        config.latency.fatal_ms = 10;
        config.latency.restore_after_packets = 0;

        assert_eq!(config.sanitize(), 5);
        assert_eq!(config.region_bytes, DEFAULT_REGION_BYTES);
        assert_eq!(config.latency.fatal_ms, 25);
        assert_eq!(config.latency.restore_after_packets, 1);
        assert_eq!(config.degraded_precision, Precision::Half);
        assert_eq!(config.sidetone_capacity, DEFAULT_SIDETONE_CAPACITY);
    }

    #[test]
    fn test_zero_poll_interval_is_clamped() {
        let latency = LatencyConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(latency.poll_interval(), Duration::from_millis(1));
    }
}
