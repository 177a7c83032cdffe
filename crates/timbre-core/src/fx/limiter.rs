//! Lookahead peak limiter, the last stage of the dynamics chain
//!
//! Feed-forward: each input sample goes into a short delay line while its
//! target gain (`ceiling / peak`) goes into a parallel ring. The gain
//! envelope chases the minimum target over the lookahead window, so the
//! reduction is in place before the peak leaves the delay. A final hard
//! clamp catches what the envelope has not fully converged on.

use crate::types::{Sample, SAMPLE_RATE};

// ═══════════════════════════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════════════════════════

/// Ring-buffer size
const MAX_DELAY: usize = 256;

/// Lookahead time in seconds (72 samples at 48 kHz)
const LOOKAHEAD_SECS: f32 = 0.0015;

/// Release time-constant in seconds
const RELEASE_SECS: f32 = 0.1;

/// Default ceiling in linear amplitude
pub const DEFAULT_CEILING: f32 = 0.99;

// ═══════════════════════════════════════════════════════════════════════════════
// Limiter
// ═══════════════════════════════════════════════════════════════════════════════

/// Mono lookahead limiter. Output never exceeds the ceiling.
pub struct PeakLimiter {
    /// Ceiling in linear amplitude
    ceiling: f32,
    /// Lookahead in samples
    lookahead: usize,

    delay: [f32; MAX_DELAY],
    /// Per-sample target gain (1.0 when below the ceiling)
    target_gains: [f32; MAX_DELAY],
    write_pos: usize,

    /// Current smoothed gain (1.0 = unity)
    gain: f32,
    /// `attack_coeff^lookahead ≈ 0.01`
    attack_coeff: f32,
    release_coeff: f32,
}

impl PeakLimiter {
    /// Limiter at [`DEFAULT_CEILING`]
    pub fn new() -> Self {
        Self::with_ceiling(DEFAULT_CEILING)
    }

    /// Limiter with a linear ceiling, clamped to (0, 1]
    pub fn with_ceiling(ceiling: f32) -> Self {
        let ceiling = if ceiling.is_finite() {
            ceiling.clamp(1e-3, 1.0)
        } else {
            DEFAULT_CEILING
        };

        let lookahead = (LOOKAHEAD_SECS * SAMPLE_RATE as f32).round() as usize;
        let lookahead = lookahead.clamp(1, MAX_DELAY);

        // coeff^N = 0.01  →  coeff = exp(ln 0.01 / N)
        let attack_coeff = (-4.605_17 / lookahead as f32).exp();
        let release_coeff = (-1.0 / (RELEASE_SECS * SAMPLE_RATE as f32)).exp();

        Self {
            ceiling,
            lookahead,
            delay: [0.0; MAX_DELAY],
            target_gains: [1.0; MAX_DELAY],
            write_pos: 0,
            gain: 1.0,
            attack_coeff,
            release_coeff,
        }
    }

    /// Ceiling in linear amplitude
    pub fn ceiling(&self) -> f32 {
        self.ceiling
    }

    /// Latency in samples
    pub fn latency_samples(&self) -> usize {
        self.lookahead
    }

    /// Process a buffer in place
    pub fn process(&mut self, buffer: &mut [Sample]) {
        for sample in buffer.iter_mut() {
            let input = if sample.is_finite() { *sample } else { 0.0 };
            let peak = input.abs();

            self.target_gains[self.write_pos] = if peak > self.ceiling {
                self.ceiling / peak
            } else {
                1.0
            };

            let min_gain = self.window_min_gain();
            let coeff = if min_gain < self.gain {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.gain = self.gain * coeff + min_gain * (1.0 - coeff);

            let read_pos = (self.write_pos + MAX_DELAY - self.lookahead) % MAX_DELAY;
            let out = self.delay[read_pos] * self.gain;
            self.delay[self.write_pos] = input;

            *sample = out.clamp(-self.ceiling, self.ceiling);
            self.write_pos = (self.write_pos + 1) % MAX_DELAY;
        }
    }

    #[inline]
    fn window_min_gain(&self) -> f32 {
        let mut min = 1.0_f32;
        for i in 0..self.lookahead {
            let pos = (self.write_pos + MAX_DELAY - i) % MAX_DELAY;
            min = min.min(self.target_gains[pos]);
        }
        min
    }

    /// Clear delay line and envelope
    pub fn reset(&mut self) {
        self.delay = [0.0; MAX_DELAY];
        self.target_gains = [1.0; MAX_DELAY];
        self.write_pos = 0;
        self.gain = 1.0;
    }
}

impl Default for PeakLimiter {
    fn default() -> Self {
        Self::new()
    }
}
