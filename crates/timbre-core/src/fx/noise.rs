//! Stationary noise suppression
//!
//! Works in short blocks: a noise floor is tracked from the block RMS
//! (fast to fall, slow to rise), and each block is scaled by a
//! subtraction-style gain `1 - over_subtraction * floor / rms`, bounded
//! below by the maximum reduction. The gain is smoothed per sample and a
//! light one-pole lowpass takes the edge off residual hiss.

use super::{Stage, StageKind};
use crate::types::{db_to_linear, Sample};

/// Analysis block size in samples (~1.3 ms at 48 kHz)
const BLOCK: usize = 64;
/// Floor tracking: fraction kept when the block is quieter than the floor
const FLOOR_FALL: f32 = 0.9;
/// Floor tracking: per-block growth when the block is louder
const FLOOR_RISE: f32 = 1.005;
/// Initial floor before anything has been heard
const INITIAL_FLOOR: f32 = 1e-4;
/// Per-sample gain smoothing
const GAIN_SMOOTHING: f32 = 0.995;
/// One-pole lowpass weights (current, previous)
const SMOOTH_CURRENT: f32 = 0.95;
const SMOOTH_PREVIOUS: f32 = 0.05;

/// Default maximum attenuation in dB
pub const DEFAULT_MAX_REDUCTION_DB: f32 = 18.0;
/// Default over-subtraction factor
pub const DEFAULT_OVER_SUBTRACTION: f32 = 1.5;

pub struct NoiseSuppressor {
    noise_floor: f32,
    min_gain: f32,
    over_subtraction: f32,
    gain: f32,
    previous: f32,
}

impl NoiseSuppressor {
    pub fn new(max_reduction_db: f32, over_subtraction: f32) -> Self {
        Self {
            noise_floor: INITIAL_FLOOR,
            min_gain: db_to_linear(-max_reduction_db.abs()),
            over_subtraction: over_subtraction.max(0.0),
            gain: 1.0,
            previous: 0.0,
        }
    }

    /// Current noise floor estimate (RMS)
    pub fn noise_floor(&self) -> f32 {
        self.noise_floor
    }

    fn track_floor(&mut self, rms: f32) {
        if rms < self.noise_floor {
            self.noise_floor = self.noise_floor * FLOOR_FALL + rms * (1.0 - FLOOR_FALL);
        } else {
            self.noise_floor = (self.noise_floor * FLOOR_RISE).min(rms);
        }
        self.noise_floor = self.noise_floor.max(1e-7);
    }

    fn target_gain(&self, rms: f32) -> f32 {
        if rms <= f32::EPSILON {
            return self.min_gain;
        }
        (1.0 - self.over_subtraction * self.noise_floor / rms).clamp(self.min_gain, 1.0)
    }
}

impl Default for NoiseSuppressor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REDUCTION_DB, DEFAULT_OVER_SUBTRACTION)
    }
}

impl Stage for NoiseSuppressor {
    fn process(&mut self, buffer: &mut [Sample]) {
        for block in buffer.chunks_mut(BLOCK) {
            for s in block.iter_mut() {
                if !s.is_finite() {
                    *s = 0.0;
                }
            }
            let rms = (block.iter().map(|s| s * s).sum::<f32>() / block.len() as f32).sqrt();
            self.track_floor(rms);
            let target = self.target_gain(rms);

            for s in block.iter_mut() {
                self.gain = self.gain * GAIN_SMOOTHING + target * (1.0 - GAIN_SMOOTHING);
                let smoothed = SMOOTH_CURRENT * *s + SMOOTH_PREVIOUS * self.previous;
                self.previous = *s;
                *s = smoothed * self.gain;
            }
        }
    }

    fn kind(&self) -> StageKind {
        StageKind::NoiseSuppression
    }

    fn reset(&mut self) {
        self.noise_floor = INITIAL_FLOOR;
        self.gain = 1.0;
        self.previous = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rms(buf: &[f32]) -> f32 {
        (buf.iter().map(|s| s * s).sum::<f32>() / buf.len() as f32).sqrt()
    }

    fn hiss(len: usize, amplitude: f32, seed: &mut u32) -> Vec<f32> {
        (0..len)
            .map(|_| {
                *seed ^= *seed << 13;
                *seed ^= *seed >> 17;
                *seed ^= *seed << 5;
                amplitude * ((*seed as f32 / u32::MAX as f32) * 2.0 - 1.0)
            })
            .collect()
    }

    #[test]
    fn test_steady_noise_is_attenuated() {
        let mut ns = NoiseSuppressor::default();
        let mut seed = 42;
        let mut last = Vec::new();
        // two seconds of steady hiss
        for _ in 0..375 {
            last = hiss(256, 0.01, &mut seed);
            ns.process(&mut last);
        }
        let reference = hiss(256, 0.01, &mut seed);
        assert!(rms(&last) < rms(&reference) * 0.5);
    }

    #[test]
    fn test_loud_signal_over_floor_is_kept() {
        let mut ns = NoiseSuppressor::default();
        let mut seed = 7;
        for _ in 0..100 {
            let mut noise = hiss(256, 0.002, &mut seed);
            ns.process(&mut noise);
        }

        let mut last = Vec::new();
        for packet in 0..20 {
            last = (0..256)
                .map(|i| 0.5 * (((packet * 256 + i) as f32) * 0.02).sin())
                .collect();
            ns.process(&mut last);
        }
        let reference: Vec<f32> = (0..256)
            .map(|i| 0.5 * (((19 * 256 + i) as f32) * 0.02).sin())
            .collect();
        assert!(rms(&last) > rms(&reference) * 0.8);
    }

    #[test]
    fn test_silence_stays_silent() {
        let mut ns = NoiseSuppressor::default();
        let mut buf = [0.0; 512];
        ns.process(&mut buf);
        assert!(buf.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_non_finite_samples_are_zeroed() {
        let mut ns = NoiseSuppressor::default();
        let mut buf = [f32::NAN, f32::INFINITY, 0.1, 0.1];
        ns.process(&mut buf);
        assert!(buf.iter().all(|s| s.is_finite()));
    }
}
