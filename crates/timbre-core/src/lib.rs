//! Timbre Core - real-time voice-timbre conversion engine
//!
//! The engine sits behind a capture interceptor that hands it microphone
//! packets through a shared memory region. Each packet runs synchronously
//! through:
//!
//! ```text
//! copy-in → FxGraph::preprocess → inference (in place) → FxGraph::postprocess → copy-out
//! ```
//!
//! while a low-priority watchdog observes per-packet latency and degrades
//! precision / enables concealment when the budget is blown.

pub mod config;
pub mod engine;
pub mod ffi;
pub mod fx;
pub mod inference;
pub mod monitor;
pub mod stability;
pub mod transport;
pub mod types;

pub use engine::{Engine, EngineAtomics, EngineContext, EngineError, ModelControl};
pub use types::*;
