//! Three-band compressor followed by the peak limiter
//!
//! The signal is split with Linkwitz-Riley 24 dB/oct crossovers into
//! low / mid / high, each band is compressed independently, the bands are
//! summed, and the sum goes through [`PeakLimiter`]. Compressing per band
//! keeps a loud low end from ducking the formant region the conversion
//! model just shaped.

use super::limiter::PeakLimiter;
use super::{Stage, StageKind};
use crate::types::{db_to_linear, linear_to_db, Sample, SAMPLE_RATE};

/// Envelope attack time in seconds
const ATTACK_SECS: f32 = 0.005;
/// Envelope release time in seconds
const RELEASE_SECS: f32 = 0.08;

const BAND_COUNT: usize = 3;

/// Two-pole state-variable filter, the building block of the LR24 split
#[derive(Clone)]
struct SvfFilter {
    ic1eq: f32,
    ic2eq: f32,
    k: f32,
    a1: f32,
    a2: f32,
    a3: f32,
}

impl SvfFilter {
    /// Butterworth Q (0.707), which cascades to LR24
    fn new(cutoff: f32) -> Self {
        let cutoff = cutoff.clamp(20.0, SAMPLE_RATE as f32 * 0.45);
        let q = std::f32::consts::FRAC_1_SQRT_2;

        let g = (std::f32::consts::PI * cutoff / SAMPLE_RATE as f32).tan();
        let k = 1.0 / q;
        let a1 = 1.0 / (1.0 + g * (g + k));
        let a2 = g * a1;
        let a3 = g * a2;
        Self {
            ic1eq: 0.0,
            ic2eq: 0.0,
            k,
            a1,
            a2,
            a3,
        }
    }

    /// Returns (lowpass, highpass)
    #[inline]
    fn process(&mut self, input: f32) -> (f32, f32) {
        let v3 = input - self.ic2eq;
        let v1 = self.a1 * self.ic1eq + self.a2 * v3;
        let v2 = self.ic2eq + self.a2 * self.ic1eq + self.a3 * v3;
        self.ic1eq = 2.0 * v1 - self.ic1eq;
        self.ic2eq = 2.0 * v2 - self.ic2eq;

        let low = v2;
        let high = input - self.k * v1 - low;
        (low, high)
    }

    fn reset(&mut self) {
        self.ic1eq = 0.0;
        self.ic2eq = 0.0;
    }
}

/// One LR24 split point: two cascaded SVFs per side
#[derive(Clone)]
struct CrossoverPoint {
    lp1: SvfFilter,
    lp2: SvfFilter,
    hp1: SvfFilter,
    hp2: SvfFilter,
}

impl CrossoverPoint {
    fn new(frequency: f32) -> Self {
        Self {
            lp1: SvfFilter::new(frequency),
            lp2: SvfFilter::new(frequency),
            hp1: SvfFilter::new(frequency),
            hp2: SvfFilter::new(frequency),
        }
    }

    /// Returns (low_band, high_band)
    #[inline]
    fn process(&mut self, input: f32) -> (f32, f32) {
        let (lp1_out, _) = self.lp1.process(input);
        let (low, _) = self.lp2.process(lp1_out);
        let (_, hp1_out) = self.hp1.process(input);
        let (_, high) = self.hp2.process(hp1_out);
        (low, high)
    }

    fn reset(&mut self) {
        self.lp1.reset();
        self.lp2.reset();
        self.hp1.reset();
        self.hp2.reset();
    }
}

/// Feed-forward compressor for one band
#[derive(Clone)]
struct BandCompressor {
    envelope: f32,
    attack_coeff: f32,
    release_coeff: f32,
}

impl BandCompressor {
    fn new() -> Self {
        Self {
            envelope: 0.0,
            attack_coeff: (-1.0 / (ATTACK_SECS * SAMPLE_RATE as f32)).exp(),
            release_coeff: (-1.0 / (RELEASE_SECS * SAMPLE_RATE as f32)).exp(),
        }
    }

    #[inline]
    fn process(&mut self, input: f32, threshold_db: f32, slope: f32) -> f32 {
        let level = input.abs();
        let coeff = if level > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope = self.envelope * coeff + level * (1.0 - coeff);

        let level_db = linear_to_db(self.envelope);
        if level_db <= threshold_db {
            return input;
        }
        input * db_to_linear((threshold_db - level_db) * slope)
    }

    fn reset(&mut self) {
        self.envelope = 0.0;
    }
}

/// Multiband compressor + limiter stage
pub struct MultibandCompressor {
    low_split: CrossoverPoint,
    high_split: CrossoverPoint,
    bands: [BandCompressor; BAND_COUNT],
    threshold_db: f32,
    /// `1 - 1/ratio`
    slope: f32,
    limiter: PeakLimiter,
}

impl MultibandCompressor {
    /// `low_hz` / `high_hz` are the two crossover points. `ratio` below 1
    /// is treated as 1 (no compression).
    pub fn new(low_hz: f32, high_hz: f32, threshold_db: f32, ratio: f32, ceiling: f32) -> Self {
        let (low_hz, high_hz) = if low_hz <= high_hz {
            (low_hz, high_hz)
        } else {
            (high_hz, low_hz)
        };
        let ratio = ratio.max(1.0);
        Self {
            low_split: CrossoverPoint::new(low_hz),
            high_split: CrossoverPoint::new(high_hz),
            bands: [BandCompressor::new(), BandCompressor::new(), BandCompressor::new()],
            threshold_db,
            slope: 1.0 - 1.0 / ratio,
            limiter: PeakLimiter::with_ceiling(ceiling),
        }
    }

    /// Limiter ceiling in linear amplitude
    pub fn ceiling(&self) -> f32 {
        self.limiter.ceiling()
    }
}

impl Stage for MultibandCompressor {
    fn process(&mut self, buffer: &mut [Sample]) {
        for sample in buffer.iter_mut() {
            let input = if sample.is_finite() { *sample } else { 0.0 };
            let (low, rest) = self.low_split.process(input);
            let (mid, high) = self.high_split.process(rest);

            let mut sum = 0.0;
            for (band, value) in self.bands.iter_mut().zip([low, mid, high]) {
                sum += band.process(value, self.threshold_db, self.slope);
            }
            *sample = sum;
        }
        self.limiter.process(buffer);
    }

    fn kind(&self) -> StageKind {
        StageKind::Dynamics
    }

    fn reset(&mut self) {
        self.low_split.reset();
        self.high_split.reset();
        for band in &mut self.bands {
            band.reset();
        }
        self.limiter.reset();
    }

    fn latency_samples(&self) -> u32 {
        self.limiter.latency_samples() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                amplitude
                    * (2.0 * std::f32::consts::PI * freq * i as f32 / SAMPLE_RATE as f32).sin()
            })
            .collect()
    }

    fn peak(buf: &[f32]) -> f32 {
        buf.iter().fold(0.0_f32, |m, s| m.max(s.abs()))
    }

    #[test]
    fn test_output_bounded_by_ceiling() {
        let mut stage = MultibandCompressor::new(250.0, 3000.0, -18.0, 3.0, 0.99);
        for packet in 0..20 {
            let mut buf: Vec<f32> = sine(150.0, 2.5, 4800)
                .into_iter()
                .zip(sine(4000.0, 2.5, 4800))
                .map(|(a, b)| a + b + packet as f32 * 0.01)
                .collect();
            stage.process(&mut buf);
            assert!(peak(&buf) <= 0.99);
        }
    }

    #[test]
    fn test_loud_signal_is_compressed() {
        let mut stage = MultibandCompressor::new(250.0, 3000.0, -24.0, 4.0, 0.99);
        let input = sine(1000.0, 0.5, 9600);
        let mut buf = input.clone();
        stage.process(&mut buf);
        // settled second half is clearly quieter than the input
        assert!(peak(&buf[4800..]) < peak(&input[4800..]) * 0.7);
    }

    #[test]
    fn test_quiet_signal_passes_near_unity() {
        let mut stage = MultibandCompressor::new(250.0, 3000.0, -6.0, 3.0, 0.99);
        let input = sine(1000.0, 0.05, 9600);
        let mut buf = input.clone();
        stage.process(&mut buf);
        let ratio = peak(&buf[4800..]) / peak(&input[4800..]);
        assert!((ratio - 1.0).abs() < 0.1, "ratio {}", ratio);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut stage = MultibandCompressor::new(250.0, 3000.0, -18.0, 3.0, 0.99);
        let mut buf = sine(500.0, 0.8, 1024);
        stage.process(&mut buf);
        stage.reset();

        let mut silence = [0.0; 256];
        stage.process(&mut silence);
        assert!(silence.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_reports_limiter_latency() {
        let stage = MultibandCompressor::new(250.0, 3000.0, -18.0, 3.0, 0.99);
        assert_eq!(stage.latency_samples(), 72);
        assert_eq!(stage.kind(), StageKind::Dynamics);
    }
}
