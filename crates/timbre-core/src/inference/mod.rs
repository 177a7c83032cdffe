//! Inference - conversion models on interchangeable compute backends
//!
//! - [`InferenceManager`]: model lifecycle, delegate benchmarking, per-packet runs
//! - [`InferenceBackend`] / [`BackendProvider`]: the backend seam
//! - [`CpuBackend`]: the always-available reference backend
//! - [`select_delegate`]: fastest-within-cutoff selection with CPU fallback

mod backend;
mod cpu;
mod delegate;
mod error;
mod manager;
mod model;

pub use backend::{BackendProvider, DefaultBackendProvider, InferenceBackend};
pub use cpu::CpuBackend;
pub use delegate::{select_delegate, Delegate, DelegateCandidate};
pub use error::{InferenceError, InferenceResult};
pub use manager::{InferenceManager, DEFAULT_BENCHMARK_RUNS};
pub use model::{Model, ModelFormat};

pub(crate) use backend::panic_message;

#[cfg(test)]
pub(crate) use backend::test_support;
