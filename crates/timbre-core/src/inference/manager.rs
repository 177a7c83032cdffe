//! Inference manager - model lifecycle, delegate benchmarking, per-packet runs

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::backend::{guarded, BackendProvider, DefaultBackendProvider, InferenceBackend};
use super::delegate::{select_delegate, Delegate, DelegateCandidate};
use super::error::{InferenceError, InferenceResult};
use super::model::Model;
use crate::stability::{Precision, StabilityController};
use crate::types::{Sample, BENCHMARK_CUTOFF};

/// Default number of timed benchmark passes per delegate
pub const DEFAULT_BENCHMARK_RUNS: usize = 5;

/// Longest packet used for benchmarking (10 ms at 48 kHz)
const MAX_BENCHMARK_SAMPLES: usize = 480;

/// The model currently bound to a backend
struct ActiveModel {
    model: Model,
    backend: Box<dyn InferenceBackend>,
    /// Cached so the per-packet path does not allocate
    backend_name: String,
}

/// Owns at most one active model and runs it each packet
pub struct InferenceManager {
    provider: Arc<dyn BackendProvider>,
    stability: Arc<StabilityController>,
    cutoff: Duration,
    benchmark_runs: usize,
    active: Option<ActiveModel>,
    /// Benchmark scratch, reused across loads
    scratch: Vec<Sample>,
}

impl InferenceManager {
    /// Manager backed by the CPU-only provider
    pub fn new(stability: Arc<StabilityController>) -> Self {
        Self::with_provider(Arc::new(DefaultBackendProvider), stability)
    }

    pub fn with_provider(
        provider: Arc<dyn BackendProvider>,
        stability: Arc<StabilityController>,
    ) -> Self {
        Self {
            provider,
            stability,
            cutoff: BENCHMARK_CUTOFF,
            benchmark_runs: DEFAULT_BENCHMARK_RUNS,
            active: None,
            scratch: Vec::new(),
        }
    }

    /// Override the benchmark cutoff and pass count
    pub fn with_benchmark(mut self, cutoff: Duration, runs: usize) -> Self {
        self.cutoff = cutoff;
        self.benchmark_runs = runs.max(1);
        self
    }

    /// Load a model, replacing any active one.
    ///
    /// Returns false (no model active) on any failure.
    pub fn load_model(&mut self, path: &Path, capacity: usize, sample_rate: u32) -> bool {
        match self.try_load_model(path, capacity, sample_rate) {
            Ok(()) => true,
            Err(e) => {
                log::error!("[INFERENCE] {}", e);
                false
            }
        }
    }

    /// Load a model, replacing any active one.
    ///
    /// The previous model is always unloaded first. The benchmark picks the
    /// delegate; a load failure on that delegate is final, there is no
    /// retry on another tier. The caller holds the manager for the whole
    /// load, which is what keeps the audio path from running a half-loaded
    /// backend.
    pub fn try_load_model(
        &mut self,
        path: &Path,
        capacity: usize,
        sample_rate: u32,
    ) -> InferenceResult<()> {
        self.unload_model();
        self.load_inner(path, capacity, sample_rate)
    }

    fn load_inner(&mut self, path: &Path, capacity: usize, sample_rate: u32) -> InferenceResult<()> {
        let mut model = Model::new(path)?;
        let selected = self.benchmark_delegates(path, capacity, sample_rate)?;
        model.set_delegate(selected.delegate);

        let mut backend = self
            .provider
            .create(model.format(), selected.delegate)
            .ok_or_else(|| InferenceError::ModelLoad {
                path: path.to_path_buf(),
                delegate: selected.delegate,
                reason: "delegate unavailable".into(),
            })?;

        let backend_name = backend.name().to_string();
        guarded(&backend_name, || backend.load(&model, capacity, sample_rate)).map_err(|e| {
            match e {
                InferenceError::ModelLoad { .. } => e,
                other => InferenceError::ModelLoad {
                    path: path.to_path_buf(),
                    delegate: selected.delegate,
                    reason: other.to_string(),
                },
            }
        })?;

        log::info!(
            "[INFERENCE] Loaded {} ({:?}) on {} via {}",
            model.name(),
            model.format(),
            selected.delegate,
            backend_name
        );
        self.active = Some(ActiveModel {
            model,
            backend,
            backend_name,
        });
        Ok(())
    }

    /// Benchmark every delegate the provider offers for this model and
    /// select one.
    ///
    /// Each candidate gets one warm-up pass and `benchmark_runs` timed
    /// passes over silence; its latency is the median. Candidates that fail
    /// are logged and skipped.
    pub fn benchmark_delegates(
        &mut self,
        path: &Path,
        capacity: usize,
        sample_rate: u32,
    ) -> InferenceResult<DelegateCandidate> {
        let model = Model::new(path)?;
        let packet_len = capacity.clamp(1, MAX_BENCHMARK_SAMPLES);
        self.scratch.resize(packet_len, 0.0);

        let mut candidates = Vec::new();
        for delegate in self.provider.delegates(model.format()) {
            match self.benchmark_one(&model, delegate, capacity, sample_rate) {
                Ok(latency) => {
                    log::info!(
                        "[INFERENCE] Benchmark {}: {:.2} ms",
                        delegate,
                        latency.as_secs_f64() * 1000.0
                    );
                    candidates.push(DelegateCandidate::new(delegate, latency));
                }
                Err(e) => log::warn!("[INFERENCE] Benchmark {} skipped: {}", delegate, e),
            }
        }

        let selected = select_delegate(&candidates, self.cutoff);
        log::info!(
            "[INFERENCE] Selected {} for {} ({} candidates, cutoff {} ms)",
            selected.delegate,
            model.name(),
            candidates.len(),
            self.cutoff.as_millis()
        );
        Ok(selected)
    }

    fn benchmark_one(
        &mut self,
        model: &Model,
        delegate: Delegate,
        capacity: usize,
        sample_rate: u32,
    ) -> InferenceResult<Duration> {
        let mut backend = self
            .provider
            .create(model.format(), delegate)
            .ok_or_else(|| InferenceError::ModelLoad {
                path: model.path().to_path_buf(),
                delegate,
                reason: "delegate unavailable".into(),
            })?;
        let name = backend.name().to_string();
        let runs = self.benchmark_runs;
        let scratch = &mut self.scratch;

        let result = guarded(&name, || {
            backend.load(model, capacity, sample_rate)?;

            let mut timings = Vec::with_capacity(runs);
            for pass in 0..=runs {
                scratch.iter_mut().for_each(|s| *s = 0.0);
                let start = Instant::now();
                backend.run(&mut scratch[..], Precision::Full)?;
                // pass 0 is warm-up
                if pass > 0 {
                    timings.push(start.elapsed());
                }
            }
            timings.sort_unstable();
            Ok(timings[timings.len() / 2])
        });

        let _ = guarded(&name, || {
            backend.unload();
            Ok(())
        });
        result
    }

    /// Run the active model over `buffer` in place at the current precision.
    ///
    /// Backend errors and panics are contained here and returned as
    /// [`InferenceError::Backend`] / [`InferenceError::Panicked`].
    pub fn run_inference(&mut self, buffer: &mut [Sample]) -> InferenceResult<()> {
        let active = self.active.as_mut().ok_or(InferenceError::NotLoaded)?;
        let precision = self.stability.precision();

        let backend = &mut active.backend;
        guarded(&active.backend_name, || backend.run(buffer, precision))
    }

    /// Release the active model. No-op when nothing is loaded.
    pub fn unload_model(&mut self) {
        if let Some(mut active) = self.active.take() {
            let name = active.backend_name.clone();
            if let Err(e) = guarded(&name, || {
                active.backend.unload();
                Ok(())
            }) {
                log::error!("[INFERENCE] Unload of {} failed: {}", active.model.name(), e);
            }
            log::info!("[INFERENCE] Unloaded {}", active.model.name());
        }
    }

    /// The active model, if any
    pub fn active_model(&self) -> Option<&Model> {
        self.active.as_ref().map(|a| &a.model)
    }

    /// A model is active
    pub fn is_ready(&self) -> bool {
        self.active.is_some()
    }

    /// Benchmark cutoff
    pub fn cutoff(&self) -> Duration {
        self.cutoff
    }

    /// Swap the active model's backend, keeping the model
    #[cfg(test)]
    pub(crate) fn replace_backend_for_test(&mut self, backend: Box<dyn InferenceBackend>) {
        if let Some(active) = self.active.as_mut() {
            active.backend_name = backend.name().to_string();
            active.backend = backend;
        }
    }
}

impl Drop for InferenceManager {
    fn drop(&mut self) {
        self.unload_model();
    }
}
