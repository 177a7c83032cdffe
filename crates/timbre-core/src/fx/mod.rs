//! FX graph - signal conditioning around the conversion step
//!
//! The graph holds four replaceable stages behind a single capability,
//! [`Stage::process`], and runs them in one of three fixed arrangements:
//!
//! ```text
//! preprocess:      echo cancellation → noise suppression
//! postprocess:     concealment                      (concealment active)
//!                  multiband compressor → limiter   (otherwise)
//! low-power pass:  echo cancellation → multiband compressor → limiter
//! ```
//!
//! Order is significant: noise suppression assumes echo has already been
//! attenuated. The postprocess branch is exclusive, concealment replaces
//! the dynamics stage rather than feeding it.

mod concealment;
mod dynamics;
mod echo;
mod limiter;
mod noise;

pub use concealment::PacketLossConcealer;
pub use dynamics::MultibandCompressor;
pub use echo::EchoCanceller;
pub use limiter::PeakLimiter;
pub use noise::NoiseSuppressor;

use std::sync::Arc;

use crate::config::FxConfig;
use crate::stability::StabilityController;
use crate::types::Sample;

/// Identifies a stage slot in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum StageKind {
    EchoCancellation = 0,
    NoiseSuppression = 1,
    Dynamics = 2,
    Concealment = 3,
}

impl StageKind {
    /// All stage kinds in slot order
    pub const ALL: [StageKind; 4] = [
        StageKind::EchoCancellation,
        StageKind::NoiseSuppression,
        StageKind::Dynamics,
        StageKind::Concealment,
    ];

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::EchoCancellation => "Echo Cancellation",
            StageKind::NoiseSuppression => "Noise Suppression",
            StageKind::Dynamics => "Compressor/Limiter",
            StageKind::Concealment => "Packet-Loss Concealment",
        }
    }
}

/// A signal-conditioning stage: processes a buffer of N mono samples in place
pub trait Stage: Send {
    /// Process a buffer in place
    fn process(&mut self, buffer: &mut [Sample]);

    /// Which slot this stage fills
    fn kind(&self) -> StageKind;

    /// Clear internal state
    fn reset(&mut self) {}

    /// Observe the final output of a pass (the signal sent to the listener).
    ///
    /// Called on every stage after each pass. The echo canceller uses it as
    /// its far-end reference.
    fn observe_output(&mut self, _output: &[Sample]) {}

    /// Processing latency in samples
    fn latency_samples(&self) -> u32 {
        0
    }
}

/// The four stages a graph is built from
pub struct FxStages {
    pub echo: Box<dyn Stage>,
    pub noise: Box<dyn Stage>,
    pub dynamics: Box<dyn Stage>,
    pub concealment: Box<dyn Stage>,
}

impl FxStages {
    /// Built-in stages configured from `config`
    pub fn from_config(config: &FxConfig) -> Self {
        Self {
            echo: Box::new(EchoCanceller::new(
                config.echo_taps,
                config.echo_step_size,
                config.gate_threshold,
            )),
            noise: Box::new(NoiseSuppressor::new(
                config.noise_max_reduction_db,
                config.noise_over_subtraction,
            )),
            dynamics: Box::new(MultibandCompressor::new(
                config.crossover_low_hz,
                config.crossover_high_hz,
                config.compressor_threshold_db,
                config.compressor_ratio,
                config.limiter_ceiling,
            )),
            concealment: Box::new(PacketLossConcealer::with_floor(config.concealment_floor)),
        }
    }

    fn get_mut(&mut self, kind: StageKind) -> &mut dyn Stage {
        match kind {
            StageKind::EchoCancellation => self.echo.as_mut(),
            StageKind::NoiseSuppression => self.noise.as_mut(),
            StageKind::Dynamics => self.dynamics.as_mut(),
            StageKind::Concealment => self.concealment.as_mut(),
        }
    }
}

impl Default for FxStages {
    fn default() -> Self {
        Self::from_config(&FxConfig::default())
    }
}

/// Ordered, swappable pipeline of conditioning stages
pub struct FxGraph {
    stages: FxStages,
    stability: Arc<StabilityController>,
    /// Per-slot invocation counts (diagnostics)
    invocations: [u64; 4],
    /// Whether the previous postprocess ran concealment
    concealing: bool,
}

impl FxGraph {
    /// Build a graph from the built-in stages
    pub fn new(config: &FxConfig, stability: Arc<StabilityController>) -> Self {
        Self::with_stages(FxStages::from_config(config), stability)
    }

    /// Build a graph from caller-supplied stages
    pub fn with_stages(stages: FxStages, stability: Arc<StabilityController>) -> Self {
        log::info!(
            "[FX] Graph ready: echo={} noise={} dynamics={} concealment={}",
            stages.echo.kind().name(),
            stages.noise.kind().name(),
            stages.dynamics.kind().name(),
            stages.concealment.kind().name(),
        );
        Self {
            stages,
            stability,
            invocations: [0; 4],
            concealing: false,
        }
    }

    #[inline]
    fn run(&mut self, kind: StageKind, buffer: &mut [Sample]) {
        self.stages.get_mut(kind).process(buffer);
        self.invocations[kind as usize] += 1;
    }

    fn observe(&mut self, output: &[Sample]) {
        for kind in StageKind::ALL {
            self.stages.get_mut(kind).observe_output(output);
        }
    }

    /// Before conversion: echo cancellation, then noise suppression
    pub fn preprocess(&mut self, buffer: &mut [Sample]) {
        self.run(StageKind::EchoCancellation, buffer);
        self.run(StageKind::NoiseSuppression, buffer);
    }

    /// After conversion: concealment only when active, otherwise
    /// compression/limiting only
    pub fn postprocess(&mut self, buffer: &mut [Sample]) {
        let concealment_active = self.stability.state().concealment_active;

        if concealment_active {
            if !self.concealing {
                log::debug!("[FX] Entering concealment");
                self.concealing = true;
            }
            self.run(StageKind::Concealment, buffer);
        } else {
            if self.concealing {
                log::debug!("[FX] Leaving concealment");
                self.stages.concealment.reset();
                self.concealing = false;
            }
            self.run(StageKind::Dynamics, buffer);
        }

        self.observe(buffer);
    }

    /// Conversion disabled: echo control and compression/limiting only
    pub fn low_power_pass(&mut self, buffer: &mut [Sample]) {
        self.run(StageKind::EchoCancellation, buffer);
        self.run(StageKind::Dynamics, buffer);
        self.observe(buffer);
    }

    /// Reset every stage and leave concealment
    pub fn reset(&mut self) {
        for kind in StageKind::ALL {
            self.stages.get_mut(kind).reset();
        }
        self.concealing = false;
    }

    /// How many times a slot has processed a buffer
    pub fn invocations(&self, kind: StageKind) -> u64 {
        self.invocations[kind as usize]
    }

    /// Total latency of the conversion path (pre + post, normal mode)
    pub fn latency_samples(&self) -> u32 {
        self.stages.echo.latency_samples()
            + self.stages.noise.latency_samples()
            + self.stages.dynamics.latency_samples()
    }
}
