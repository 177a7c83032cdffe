//! Common types for Timbre
//!
//! Fundamental sample types and the fixed operating constants shared by
//! every stage of the real-time path.

use std::time::Duration;

/// Operating sample rate (48kHz). Fixed for the lifetime of an engine;
/// changing it requires a full re-initialization.
pub const SAMPLE_RATE: u32 = 48000;

/// Audio sample type (32-bit float, mono)
pub type Sample = f32;

/// Size of one sample in the shared region
pub const SAMPLE_SIZE: usize = std::mem::size_of::<Sample>();

/// Default shared-region capacity: 65536 bytes = 16384 samples
pub const DEFAULT_REGION_BYTES: usize = 65536;

/// Per-packet latency budget. Packets finishing under this count toward recovery.
pub const LATENCY_BUDGET: Duration = Duration::from_millis(20);

/// Per-packet latency above which the engine is forced into degraded mode
pub const FATAL_LATENCY: Duration = Duration::from_millis(30);

/// Maximum benchmark latency for a delegate to be eligible (CPU is always eligible)
pub const BENCHMARK_CUTOFF: Duration = Duration::from_millis(20);

/// A view over one packet of samples inside the shared region.
///
/// The packet borrows the region, so it can never outlive it.
#[derive(Debug)]
pub struct AudioPacket<'a> {
    samples: &'a mut [Sample],
    sample_rate: u32,
}

impl<'a> AudioPacket<'a> {
    /// Wrap a borrowed run of samples
    pub fn new(samples: &'a mut [Sample], sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    /// Number of samples in the packet
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the packet is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample rate of the packet
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration of audio carried by this packet
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Read-only sample access
    #[inline]
    pub fn as_slice(&self) -> &[Sample] {
        self.samples
    }

    /// Mutable sample access for in-place processing
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [Sample] {
        self.samples
    }
}

/// Convert a decibel value to linear amplitude
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert a linear amplitude to decibels (floored at -120 dB)
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    20.0 * linear.max(1e-6).log10()
}
