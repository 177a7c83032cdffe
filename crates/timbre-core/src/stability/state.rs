//! Engine state shared between the watchdog (writer) and the audio path (reader)

use serde::{Deserialize, Serialize};

/// Numeric precision the inference backend runs at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    /// Full precision (normal operation)
    #[default]
    Full,
    /// Half precision (degraded)
    Half,
    /// Reduced / quantized precision (deepest degradation)
    Reduced,
}

impl Precision {
    /// Display name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Precision::Full => "FP32",
            Precision::Half => "FP16",
            Precision::Reduced => "INT8",
        }
    }
}

/// Degrade/restore state machine mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityMode {
    Normal,
    Degraded,
}

/// Process-wide mutable state owned by the stability controller.
///
/// Invariant: `degraded == (precision != Precision::Full)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineState {
    pub degraded: bool,
    pub precision: Precision,
    pub concealment_active: bool,
}

impl EngineState {
    /// Initial state: full precision, no concealment
    pub const INITIAL: EngineState = EngineState {
        degraded: false,
        precision: Precision::Full,
        concealment_active: false,
    };

    /// Degraded state at the given (non-full) precision
    pub fn degraded(precision: Precision) -> Self {
        debug_assert!(precision != Precision::Full);
        Self {
            degraded: true,
            precision,
            concealment_active: true,
        }
    }

    /// Mode of the state machine this state corresponds to
    pub fn mode(&self) -> StabilityMode {
        if self.degraded {
            StabilityMode::Degraded
        } else {
            StabilityMode::Normal
        }
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::INITIAL
    }
}
