//! Lock-free engine statistics and switches
//!
//! Written by the audio thread, read from anywhere (UI, probe, FFI host).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Engine counters shared across threads
pub struct EngineAtomics {
    /// Packets offered to `process_packet`
    pub packets: AtomicU64,
    /// Packets answered with pass-through (`false`)
    pub pass_through: AtomicU64,
    /// Packets whose inference failed or panicked
    pub inference_failures: AtomicU64,
    /// Most recent packet latency in microseconds
    pub last_latency_us: AtomicU64,
    /// Worst packet latency in microseconds
    pub max_latency_us: AtomicU64,
    /// Packets over the fatal threshold
    pub over_fatal: AtomicU64,
    /// Conversion on (normal path) / off (low-power path)
    pub conversion_enabled: AtomicBool,
}

impl EngineAtomics {
    pub fn new() -> Self {
        Self {
            packets: AtomicU64::new(0),
            pass_through: AtomicU64::new(0),
            inference_failures: AtomicU64::new(0),
            last_latency_us: AtomicU64::new(0),
            max_latency_us: AtomicU64::new(0),
            over_fatal: AtomicU64::new(0),
            conversion_enabled: AtomicBool::new(true),
        }
    }

    #[inline]
    pub fn conversion_enabled(&self) -> bool {
        self.conversion_enabled.load(Ordering::Relaxed)
    }

    pub fn set_conversion_enabled(&self, enabled: bool) {
        self.conversion_enabled.store(enabled, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_latency(&self, latency: Duration) {
        let us = latency.as_micros().min(u64::MAX as u128) as u64;
        self.packets.fetch_add(1, Ordering::Relaxed);
        self.last_latency_us.store(us, Ordering::Relaxed);
        self.max_latency_us.fetch_max(us, Ordering::Relaxed);
    }

    pub fn packets(&self) -> u64 {
        self.packets.load(Ordering::Relaxed)
    }

    pub fn pass_through(&self) -> u64 {
        self.pass_through.load(Ordering::Relaxed)
    }

    pub fn inference_failures(&self) -> u64 {
        self.inference_failures.load(Ordering::Relaxed)
    }

    pub fn over_fatal(&self) -> u64 {
        self.over_fatal.load(Ordering::Relaxed)
    }

    pub fn last_latency(&self) -> Duration {
        Duration::from_micros(self.last_latency_us.load(Ordering::Relaxed))
    }

    pub fn max_latency(&self) -> Duration {
        Duration::from_micros(self.max_latency_us.load(Ordering::Relaxed))
    }
}

impl Default for EngineAtomics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_tracking() {
        let atomics = EngineAtomics::new();
        atomics.record_latency(Duration::from_micros(800));
        atomics.record_latency(Duration::from_micros(2500));
        atomics.record_latency(Duration::from_micros(1200));

        assert_eq!(atomics.packets(), 3);
        assert_eq!(atomics.last_latency(), Duration::from_micros(1200));
        assert_eq!(atomics.max_latency(), Duration::from_micros(2500));
    }

    #[test]
    fn test_conversion_switch() {
        let atomics = EngineAtomics::new();
        assert!(atomics.conversion_enabled());
        atomics.set_conversion_enabled(false);
        assert!(!atomics.conversion_enabled());
    }
}
