//! Backend abstraction
//!
//! Every compute target is driven through the same call shape. Hosts with
//! accelerator runtimes plug them in with a [`BackendProvider`]; the crate
//! itself ships only the CPU tier.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use super::cpu::CpuBackend;
use super::delegate::Delegate;
use super::error::{InferenceError, InferenceResult};
use super::model::{Model, ModelFormat};
use crate::stability::Precision;
use crate::types::Sample;

/// A loaded-or-loadable inference runtime bound to one delegate
pub trait InferenceBackend: Send {
    /// Load `model`, preparing for packets of up to `capacity` samples
    fn load(&mut self, model: &Model, capacity: usize, sample_rate: u32) -> InferenceResult<()>;

    /// Convert `buffer` in place at the given precision
    fn run(&mut self, buffer: &mut [Sample], precision: Precision) -> InferenceResult<()>;

    /// Release the model. No-op when nothing is loaded.
    fn unload(&mut self);

    fn name(&self) -> &str;
}

/// Creates backends for a (format, delegate) pair
pub trait BackendProvider: Send + Sync {
    /// Delegates available for `format`
    fn delegates(&self, format: ModelFormat) -> Vec<Delegate>;

    /// Instantiate a backend, `None` if the pair is unsupported
    fn create(&self, format: ModelFormat, delegate: Delegate) -> Option<Box<dyn InferenceBackend>>;
}

/// Provider offering only [`CpuBackend`]
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBackendProvider;

impl BackendProvider for DefaultBackendProvider {
    fn delegates(&self, _format: ModelFormat) -> Vec<Delegate> {
        vec![Delegate::Cpu]
    }

    fn create(&self, _format: ModelFormat, delegate: Delegate) -> Option<Box<dyn InferenceBackend>> {
        match delegate {
            Delegate::Cpu => Some(Box::new(CpuBackend::new())),
            Delegate::Dsp | Delegate::Gpu => None,
        }
    }
}

/// Extract a human-readable message from a panic payload
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        return (*msg).to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}

/// Run a backend call, converting a panic into [`InferenceError::Panicked`]
pub(crate) fn guarded<T>(
    backend: &str,
    f: impl FnOnce() -> InferenceResult<T>,
) -> InferenceResult<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(InferenceError::Panicked {
            backend: backend.to_string(),
            message: panic_message(payload),
        }),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Scripted backends for manager and engine tests

    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// What a scripted backend does on `run`
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub enum Script {
        /// Sleep, then multiply every sample by the gain
        Gain { delay: Duration, gain: f32 },
        /// Return a backend error
        Fail,
        /// Panic
        Panic,
    }

    #[derive(Default)]
    pub struct Counters {
        pub loads: AtomicUsize,
        pub runs: AtomicUsize,
        pub unloads: AtomicUsize,
    }

    pub struct ScriptedBackend {
        name: String,
        script: Script,
        fail_load: bool,
        loaded: bool,
        counters: Arc<Counters>,
    }

    impl InferenceBackend for ScriptedBackend {
        fn load(&mut self, model: &Model, _capacity: usize, _sample_rate: u32) -> InferenceResult<()> {
            self.counters.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail_load {
                return Err(InferenceError::ModelLoad {
                    path: model.path().to_path_buf(),
                    delegate: Delegate::Cpu,
                    reason: "scripted load failure".into(),
                });
            }
            self.loaded = true;
            Ok(())
        }

        fn run(&mut self, buffer: &mut [Sample], _precision: Precision) -> InferenceResult<()> {
            self.counters.runs.fetch_add(1, Ordering::SeqCst);
            match self.script {
                Script::Gain { delay, gain } => {
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    buffer.iter_mut().for_each(|s| *s *= gain);
                    Ok(())
                }
                Script::Fail => Err(InferenceError::Backend {
                    backend: self.name.clone(),
                    reason: "scripted failure".into(),
                }),
                Script::Panic => panic!("scripted panic"),
            }
        }

        fn unload(&mut self) {
            if self.loaded {
                self.counters.unloads.fetch_add(1, Ordering::SeqCst);
                self.loaded = false;
            }
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    /// Per-delegate scripts; delegates without a script are unavailable
    #[derive(Default)]
    pub struct ScriptedProvider {
        scripts: Mutex<HashMap<Delegate, (Script, bool)>>,
        pub counters: Arc<Counters>,
        pub created: Mutex<Vec<Delegate>>,
    }

    impl ScriptedProvider {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(self, delegate: Delegate, script: Script) -> Self {
            self.set(delegate, script, false);
            self
        }

        pub fn with_failing_load(self, delegate: Delegate, script: Script) -> Self {
            self.set(delegate, script, true);
            self
        }

        pub fn set(&self, delegate: Delegate, script: Script, fail_load: bool) {
            self.scripts.lock().unwrap().insert(delegate, (script, fail_load));
        }
    }

    impl BackendProvider for ScriptedProvider {
        fn delegates(&self, _format: ModelFormat) -> Vec<Delegate> {
            let scripts = self.scripts.lock().unwrap();
            Delegate::ALL
                .into_iter()
                .filter(|d| scripts.contains_key(d))
                .collect()
        }

        fn create(&self, _format: ModelFormat, delegate: Delegate) -> Option<Box<dyn InferenceBackend>> {
            let (script, fail_load) = *self.scripts.lock().unwrap().get(&delegate)?;
            self.created.lock().unwrap().push(delegate);
            Some(Box::new(ScriptedBackend {
                name: format!("scripted-{}", delegate),
                script,
                fail_load,
                loaded: false,
                counters: Arc::clone(&self.counters),
            }))
        }
    }
}
