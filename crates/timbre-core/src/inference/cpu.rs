//! CPU backend
//!
//! Always available. The model file is memory-mapped for the lifetime of
//! the load and its bytes parameterize a reference timbre transform: a
//! chain of first-order all-pass sections mixed with the dry signal (a
//! formant-shifting warp), followed by a spectral-tilt shaper. Lower
//! precision runs fewer sections.

use std::fs::File;

use memmap2::Mmap;

use super::backend::InferenceBackend;
use super::delegate::Delegate;
use super::error::{InferenceError, InferenceResult};
use super::model::Model;
use crate::stability::Precision;
use crate::types::Sample;

/// All-pass sections at full precision
const MAX_ORDER: usize = 8;

#[derive(Debug, Clone, Copy, Default)]
struct AllPass {
    x1: f32,
    y1: f32,
}

impl AllPass {
    #[inline]
    fn process(&mut self, x: f32, lambda: f32) -> f32 {
        let y = -lambda * x + self.x1 + lambda * self.y1;
        self.x1 = x;
        self.y1 = y;
        y
    }
}

/// Transform parameters derived from the model weights
#[derive(Debug, Clone, Copy, PartialEq)]
struct WarpParams {
    /// All-pass coefficient in [0.1, 0.3]
    lambda: f32,
    /// Tilt amount in [-0.4, 0.4]
    tilt: f32,
}

impl WarpParams {
    fn from_weights(weights: &[u8]) -> Self {
        let len = weights.len().max(1) as f32;
        let mean = weights.iter().map(|&b| b as f32).sum::<f32>() / len / 255.0;
        let half = weights.len() / 2;
        let (head, tail) = weights.split_at(half);
        let head_mean = head.iter().map(|&b| b as f32).sum::<f32>() / head.len().max(1) as f32;
        let tail_mean = tail.iter().map(|&b| b as f32).sum::<f32>() / tail.len().max(1) as f32;

        Self {
            lambda: 0.1 + 0.2 * mean,
            tilt: ((head_mean - tail_mean) / 255.0 * 0.8).clamp(-0.4, 0.4),
        }
    }
}

struct Loaded {
    /// Kept mapped while the model is active
    weights: Mmap,
    params: WarpParams,
}

/// Reference CPU backend
pub struct CpuBackend {
    loaded: Option<Loaded>,
    sections: [AllPass; MAX_ORDER],
    /// Sections used by the previous packet
    order: usize,
    previous: f32,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self {
            loaded: None,
            sections: [AllPass::default(); MAX_ORDER],
            order: MAX_ORDER,
            previous: 0.0,
        }
    }

    /// Mapped model size in bytes (0 when unloaded)
    pub fn weights_len(&self) -> usize {
        self.loaded.as_ref().map_or(0, |l| l.weights.len())
    }

    fn order(precision: Precision) -> usize {
        match precision {
            Precision::Full => MAX_ORDER,
            Precision::Half => MAX_ORDER / 2,
            Precision::Reduced => 0,
        }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for CpuBackend {
    fn load(&mut self, model: &Model, _capacity: usize, _sample_rate: u32) -> InferenceResult<()> {
        self.unload();
        let load_err = |reason: String| InferenceError::ModelLoad {
            path: model.path().to_path_buf(),
            delegate: Delegate::Cpu,
            reason,
        };

        let file = File::open(model.path()).map_err(|e| load_err(e.to_string()))?;
        let len = file.metadata().map_err(|e| load_err(e.to_string()))?.len();
        if len == 0 {
            return Err(load_err("model file is empty".into()));
        }

        // SAFETY: read-only mapping; the model file is not expected to be
        // truncated while loaded
        let weights = unsafe { Mmap::map(&file) }.map_err(|e| load_err(e.to_string()))?;
        let params = WarpParams::from_weights(&weights);

        log::debug!(
            "[INFERENCE] CPU backend mapped {} ({} bytes, lambda={:.3}, tilt={:.3})",
            model.name(),
            weights.len(),
            params.lambda,
            params.tilt
        );
        self.loaded = Some(Loaded { weights, params });
        Ok(())
    }

    fn run(&mut self, buffer: &mut [Sample], precision: Precision) -> InferenceResult<()> {
        let params = match &self.loaded {
            Some(loaded) => loaded.params,
            None => return Err(InferenceError::NotLoaded),
        };
        let order = Self::order(precision);
        if order != self.order {
            // sections that sat out keep no history into a later restore
            self.sections[order..]
                .iter_mut()
                .for_each(|s| *s = AllPass::default());
            self.order = order;
        }

        for sample in buffer.iter_mut() {
            let dry = if sample.is_finite() { *sample } else { 0.0 };

            let mut wet = dry;
            for section in &mut self.sections[..order] {
                wet = section.process(wet, params.lambda);
            }
            let warped = if order > 0 { 0.5 * (dry + wet) } else { dry };

            let shaped = warped + params.tilt * (warped - self.previous);
            self.previous = warped;
            *sample = shaped;
        }
        Ok(())
    }

    fn unload(&mut self) {
        if self.loaded.take().is_some() {
            self.sections = [AllPass::default(); MAX_ORDER];
            self.order = MAX_ORDER;
            self.previous = 0.0;
        }
    }

    fn name(&self) -> &str {
        "cpu-reference"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn model_file(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> Model {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(bytes).unwrap();
        Model::new(path).unwrap()
    }

    #[test]
    fn test_load_maps_weights() {
        let dir = tempfile::tempdir().unwrap();
        let model = model_file(&dir, "voice.tflite", &[7u8; 4096]);
        let mut backend = CpuBackend::new();
        backend.load(&model, 256, 48_000).unwrap();
        assert_eq!(backend.weights_len(), 4096);

        backend.unload();
        assert_eq!(backend.weights_len(), 0);
    }

    #[test]
    fn test_empty_model_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let model = model_file(&dir, "voice.onnx", &[]);
        let mut backend = CpuBackend::new();
        assert!(matches!(
            backend.load(&model, 256, 48_000),
            Err(InferenceError::ModelLoad { delegate: Delegate::Cpu, .. })
        ));
    }

    #[test]
    fn test_missing_model_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let model = Model::new(dir.path().join("absent.onnx")).unwrap();
        assert!(CpuBackend::new().load(&model, 256, 48_000).is_err());
    }

    #[test]
    fn test_run_without_model_is_not_loaded() {
        let mut backend = CpuBackend::new();
        let mut buf = [0.1; 16];
        assert_eq!(
            backend.run(&mut buf, Precision::Full),
            Err(InferenceError::NotLoaded)
        );
        assert_eq!(buf, [0.1; 16]);
    }

    #[test]
    fn test_transform_changes_signal_and_stays_finite() {
        let dir = tempfile::tempdir().unwrap();
        let weights: Vec<u8> = (0..2048).map(|i| (i * 31 % 251) as u8).collect();
        let model = model_file(&dir, "voice.onnx", &weights);
        let mut backend = CpuBackend::new();
        backend.load(&model, 480, 48_000).unwrap();

        for precision in [Precision::Full, Precision::Half, Precision::Reduced] {
            let input: Vec<f32> = (0..480).map(|i| 0.5 * (i as f32 * 0.07).sin()).collect();
            let mut buf = input.clone();
            backend.run(&mut buf, precision).unwrap();
            assert!(buf.iter().all(|s| s.is_finite()));
            if precision != Precision::Reduced {
                assert_ne!(buf, input);
            }
        }
    }

    #[test]
    fn test_precision_drop_clears_idle_sections() {
        let dir = tempfile::tempdir().unwrap();
        let model = model_file(&dir, "voice.onnx", &[90u8; 1024]);
        let input: Vec<f32> = (0..480).map(|i| 0.5 * (i as f32 * 0.07).sin()).collect();

        let mut backend = CpuBackend::new();
        backend.load(&model, 480, 48_000).unwrap();
        backend.run(&mut input.clone(), Precision::Full).unwrap();
        assert!(backend.sections[MAX_ORDER - 1].x1 != 0.0);

        backend.run(&mut input.clone(), Precision::Half).unwrap();
        for section in &backend.sections[MAX_ORDER / 2..] {
            assert_eq!((section.x1, section.y1), (0.0, 0.0));
        }

        // on restore the upper half starts from silence, as in a fresh backend
        let mut restored = input.clone();
        backend.run(&mut restored, Precision::Full).unwrap();
        assert!(restored.iter().all(|s| s.is_finite()));
        assert!(backend.sections[MAX_ORDER - 1].x1 != 0.0);
    }

    #[test]
    fn test_weight_params_are_bounded() {
        for weights in [vec![0u8; 64], vec![255u8; 64], (0..=255).collect::<Vec<u8>>()] {
            let params = WarpParams::from_weights(&weights);
            assert!((0.1..=0.3).contains(&params.lambda));
            assert!((-0.4..=0.4).contains(&params.tilt));
        }
    }
}
