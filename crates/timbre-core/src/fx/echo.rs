//! Acoustic echo cancellation
//!
//! An NLMS adaptive filter models the path from the listener's output back
//! into the microphone. The far-end reference is whatever the graph last
//! emitted (delivered through [`Stage::observe_output`]), aligned sample for
//! sample with the next captured packet. A residual gate zeroes what is left
//! below the threshold.

use super::{Stage, StageKind};
use crate::types::Sample;

/// Default adaptive filter length
pub const DEFAULT_TAPS: usize = 128;
/// Default NLMS step size
pub const DEFAULT_STEP_SIZE: f32 = 0.1;
/// Default residual gate threshold
pub const DEFAULT_GATE_THRESHOLD: f32 = 0.005;

/// Regularization for the NLMS normalization
const EPSILON: f32 = 1e-6;

/// NLMS echo canceller with residual gate
pub struct EchoCanceller {
    weights: Vec<f32>,
    /// Far-end history, circular, newest at `pos`
    history: Vec<f32>,
    pos: usize,
    /// Running energy of `history`
    power: f32,
    step_size: f32,
    gate_threshold: f32,
    /// Last emitted output, used as far-end for the next packet
    reference: Vec<f32>,
    reference_len: usize,
}

impl EchoCanceller {
    pub fn new(taps: usize, step_size: f32, gate_threshold: f32) -> Self {
        let taps = taps.max(1);
        Self {
            weights: vec![0.0; taps],
            history: vec![0.0; taps],
            pos: 0,
            power: 0.0,
            step_size: step_size.clamp(0.0, 1.0),
            gate_threshold: gate_threshold.max(0.0),
            reference: Vec::new(),
            reference_len: 0,
        }
    }

    /// Adaptive filter length
    pub fn taps(&self) -> usize {
        self.weights.len()
    }

    #[inline]
    fn push_far(&mut self, far: f32) {
        let taps = self.history.len();
        self.pos = (self.pos + 1) % taps;
        let old = self.history[self.pos];
        self.history[self.pos] = far;
        self.power = (self.power + far * far - old * old).max(0.0);
    }

    #[inline]
    fn estimate(&self) -> f32 {
        let taps = self.history.len();
        let mut y = 0.0;
        for (k, w) in self.weights.iter().enumerate() {
            y += w * self.history[(self.pos + taps - k) % taps];
        }
        y
    }

    #[inline]
    fn adapt(&mut self, error: f32) {
        let taps = self.history.len();
        let mu = self.step_size * error / (self.power + EPSILON);
        for (k, w) in self.weights.iter_mut().enumerate() {
            *w += mu * self.history[(self.pos + taps - k) % taps];
        }
    }
}

impl Default for EchoCanceller {
    fn default() -> Self {
        Self::new(DEFAULT_TAPS, DEFAULT_STEP_SIZE, DEFAULT_GATE_THRESHOLD)
    }
}

impl Stage for EchoCanceller {
    fn process(&mut self, buffer: &mut [Sample]) {
        for (i, sample) in buffer.iter_mut().enumerate() {
            let far = if i < self.reference_len {
                self.reference[i]
            } else {
                0.0
            };
            self.push_far(far);

            let near = if sample.is_finite() { *sample } else { 0.0 };
            let error = near - self.estimate();
            if self.power > EPSILON {
                self.adapt(error);
            }

            *sample = if error.abs() < self.gate_threshold {
                0.0
            } else {
                error
            };
        }
        // reference consumed
        self.reference_len = 0;
    }

    fn kind(&self) -> StageKind {
        StageKind::EchoCancellation
    }

    fn reset(&mut self) {
        self.weights.iter_mut().for_each(|w| *w = 0.0);
        self.history.iter_mut().for_each(|h| *h = 0.0);
        self.pos = 0;
        self.power = 0.0;
        self.reference_len = 0;
    }

    fn observe_output(&mut self, output: &[Sample]) {
        if self.reference.len() < output.len() {
            // grows once to the packet size, then reused
            self.reference.resize(output.len(), 0.0);
        }
        self.reference[..output.len()].copy_from_slice(output);
        self.reference_len = output.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn energy(buf: &[f32]) -> f32 {
        buf.iter().map(|s| s * s).sum()
    }

    #[test]
    fn test_gate_zeroes_small_residual() {
        let mut aec = EchoCanceller::default();
        let mut buf = [0.004, -0.004, 0.2, -0.3];
        aec.process(&mut buf);
        assert_eq!(buf[0], 0.0);
        assert_eq!(buf[1], 0.0);
        assert!((buf[2] - 0.2).abs() < 1e-6);
        assert!((buf[3] + 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_no_reference_passes_signal_above_gate() {
        let mut aec = EchoCanceller::new(32, 0.5, 0.0);
        let input: Vec<f32> = (0..64).map(|i| (i as f32 * 0.3).sin() * 0.5).collect();
        let mut buf = input.clone();
        aec.process(&mut buf);
        assert_eq!(buf, input);
    }

    #[test]
    fn test_converges_on_pure_echo() {
        let mut aec = EchoCanceller::new(16, 0.5, 0.0);
        let mut seed = 0x1234_5678_u32;
        let mut noise = || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            (seed as f32 / u32::MAX as f32) - 0.5
        };

        // continuous far-end; the microphone hears it at 0.6 gain, 3 samples late
        let far: Vec<f32> = (0..200 * 128).map(|_| noise()).collect();
        let echo = |n: usize| if n >= 3 { 0.6 * far[n - 3] } else { 0.0 };

        let mut raw = 0.0;
        let mut residual = 0.0;
        for packet in 0..200 {
            let base = packet * 128;
            aec.observe_output(&far[base..base + 128]);
            let mut mic: Vec<f32> = (0..128).map(|i| echo(base + i)).collect();
            raw = energy(&mic);
            aec.process(&mut mic);
            residual = energy(&mic);
        }
        assert!(residual < raw * 0.01, "raw {} residual {}", raw, residual);
    }

    #[test]
    fn test_reset_forgets_model() {
        let mut aec = EchoCanceller::new(8, 0.5, 0.0);
        aec.observe_output(&[0.5; 64]);
        let mut buf = [0.3; 64];
        aec.process(&mut buf);
        aec.reset();

        let mut buf = [0.25; 4];
        aec.process(&mut buf);
        assert_eq!(buf, [0.25; 4]);
    }
}
