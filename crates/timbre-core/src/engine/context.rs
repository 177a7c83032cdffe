//! Engine context and the off-audio-thread model handle

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::EngineConfig;
use crate::inference::{InferenceManager, InferenceResult, Model};
use crate::stability::StabilityController;
use crate::types::SAMPLE_RATE;

/// Everything the components of one engine share.
///
/// Passed explicitly at construction; there is no process-global engine
/// state.
#[derive(Clone)]
pub struct EngineContext {
    config: Arc<EngineConfig>,
    stability: Arc<StabilityController>,
}

impl EngineContext {
    pub fn new(config: EngineConfig) -> Self {
        let stability = Arc::new(StabilityController::with_degraded_precision(
            config.degraded_precision,
        ));
        Self {
            config: Arc::new(config),
            stability,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stability(&self) -> &Arc<StabilityController> {
        &self.stability
    }
}

/// Cloneable handle for loading and unloading models from a control thread.
///
/// Holding the inference lock during a load makes the audio thread's
/// `try_lock` fail, which it answers with pass-through.
#[derive(Clone)]
pub struct ModelControl {
    inference: Arc<Mutex<InferenceManager>>,
    capacity_samples: usize,
}

impl ModelControl {
    pub(crate) fn new(inference: Arc<Mutex<InferenceManager>>, capacity_samples: usize) -> Self {
        Self {
            inference,
            capacity_samples,
        }
    }

    fn lock(&self) -> MutexGuard<'_, InferenceManager> {
        self.inference.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Load (hot-swap) a model. Returns false with no model active on failure.
    pub fn load(&self, path: &Path) -> bool {
        self.lock().load_model(path, self.capacity_samples, SAMPLE_RATE)
    }

    /// Load (hot-swap) a model, returning the typed error
    pub fn try_load(&self, path: &Path) -> InferenceResult<()> {
        self.lock()
            .try_load_model(path, self.capacity_samples, SAMPLE_RATE)
    }

    pub fn unload(&self) {
        self.lock().unload_model();
    }

    /// Copy of the active model
    pub fn active_model(&self) -> Option<Model> {
        self.lock().active_model().cloned()
    }

    pub fn is_ready(&self) -> bool {
        self.lock().is_ready()
    }
}
