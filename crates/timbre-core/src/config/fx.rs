//! FX stage parameters

use serde::{Deserialize, Serialize};

/// Parameters for the built-in conditioning stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FxConfig {
    /// Echo canceller filter length in samples
    pub echo_taps: usize,
    /// NLMS step size (0..1)
    pub echo_step_size: f32,
    /// Residual gate: output magnitudes below this are zeroed
    pub gate_threshold: f32,

    /// Maximum noise attenuation in dB
    pub noise_max_reduction_db: f32,
    /// How aggressively the noise floor is subtracted
    pub noise_over_subtraction: f32,

    /// Low/mid crossover in Hz
    pub crossover_low_hz: f32,
    /// Mid/high crossover in Hz
    pub crossover_high_hz: f32,
    /// Per-band compressor threshold in dBFS
    pub compressor_threshold_db: f32,
    pub compressor_ratio: f32,
    /// Peak limiter ceiling, linear
    pub limiter_ceiling: f32,

    /// Lowest gain packet-loss concealment fades to, linear
    pub concealment_floor: f32,
}

impl Default for FxConfig {
    fn default() -> Self {
        Self {
            echo_taps: 128,
            echo_step_size: 0.1,
            gate_threshold: 0.005,
            noise_max_reduction_db: 18.0,
            noise_over_subtraction: 1.5,
            crossover_low_hz: 250.0,
            crossover_high_hz: 3000.0,
            compressor_threshold_db: -18.0,
            compressor_ratio: 3.0,
            limiter_ceiling: 0.99,
            concealment_floor: 0.25,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config: FxConfig = serde_yaml::from_str("compressor_ratio: 6.0\n").unwrap();
        assert_eq!(config.compressor_ratio, 6.0);
        assert_eq!(config.limiter_ceiling, 0.99);
        assert_eq!(config.echo_taps, 128);
    }
}
