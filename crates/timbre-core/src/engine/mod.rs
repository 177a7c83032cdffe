//! Engine - orchestration and the capture-facing API
//!
//! One [`Engine`] per shared region. The capture layer writes a packet into
//! the region and calls [`Engine::process_packet`] on its audio thread; the
//! engine processes it in place and returns whether the region now holds
//! converted audio (`true`) or the caller should forward its input
//! unmodified (`false`).

mod atomics;
mod context;
mod error;

pub use atomics::EngineAtomics;
pub use context::{EngineContext, ModelControl};
pub use error::{EngineError, EngineResult};

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, TryLockError};
use std::time::{Duration, Instant};

use crate::config::EngineConfig;
use crate::fx::FxGraph;
use crate::inference::{BackendProvider, DefaultBackendProvider, InferenceManager};
use crate::monitor::{sidetone_channel, SidetoneSender, SidetoneTap};
use crate::stability::{
    latency_channel, DegradePolicy, LatencyReporter, PinningResult, StabilityController, Watchdog,
    LATENCY_QUEUE_CAPACITY,
};
use crate::transport::{SharedBufferTransport, SharedRegion, TransportResult};
use crate::types::{Sample, SAMPLE_SIZE};

/// The real-time voice conversion engine
pub struct Engine {
    context: EngineContext,
    transport: SharedBufferTransport,
    fx: FxGraph,
    inference: Arc<Mutex<InferenceManager>>,
    reporter: LatencyReporter,
    watchdog: Watchdog,
    atomics: Arc<EngineAtomics>,
    sidetone: SidetoneSender,
    sidetone_tap: Option<SidetoneTap>,
    /// Dry copy of the current packet, restored on inference failure
    dry: Vec<Sample>,
    fatal: Duration,
    /// Elevate the thread of the first `process_packet` call
    promote_pending: bool,
}

impl Engine {
    /// Initialize over `region` with the CPU-only backend provider
    pub fn initialize(config: EngineConfig, region: SharedRegion) -> EngineResult<Self> {
        Self::initialize_with_provider(config, region, Arc::new(DefaultBackendProvider))
    }

    /// Initialize over an anonymous region of `config.region_bytes`
    pub fn with_anonymous_region(config: EngineConfig) -> EngineResult<Self> {
        let region = SharedRegion::anonymous(config.region_bytes)?;
        Self::initialize(config, region)
    }

    /// Initialize with host-supplied backends (accelerator tiers).
    ///
    /// The calling thread's scheduling is left alone: with
    /// `realtime.elevate_priority` the thread that delivers the first packet
    /// is elevated instead. Elevation and pinning are best-effort. A default
    /// model that fails to load is logged and the engine starts in
    /// pass-through.
    pub fn initialize_with_provider(
        config: EngineConfig,
        region: SharedRegion,
        provider: Arc<dyn BackendProvider>,
    ) -> EngineResult<Self> {
        let context = EngineContext::new(config);
        let config = context.config();
        let stability = Arc::clone(context.stability());

        let transport = if config.realtime.pin_memory {
            SharedBufferTransport::init(region, &stability)
        } else {
            SharedBufferTransport::unpinned(region)
        };
        let capacity_samples = transport.capacity_samples();

        let fx = FxGraph::new(&config.fx, Arc::clone(&stability));

        let inference = InferenceManager::with_provider(provider, Arc::clone(&stability))
            .with_benchmark(config.latency.benchmark_cutoff(), config.latency.benchmark_runs);
        let inference = Arc::new(Mutex::new(inference));

        let (reporter, consumer) = latency_channel(LATENCY_QUEUE_CAPACITY);
        let policy = DegradePolicy::with_thresholds(
            config.latency.budget(),
            config.latency.fatal(),
            config.latency.restore_after_packets,
        );
        let watchdog = Watchdog::spawn(
            Arc::clone(&stability),
            consumer,
            policy,
            config.latency.poll_interval(),
        )?;

        let (sidetone, sidetone_tap) = sidetone_channel(config.sidetone_capacity);

        log::info!(
            "[ENGINE] Initialized: region {} bytes, budget {} ms, fatal {} ms",
            transport.capacity_bytes(),
            config.latency.budget_ms,
            config.latency.fatal_ms
        );

        let fatal = config.latency.fatal();
        let promote_pending = config.realtime.elevate_priority;
        let default_model = config.default_model.clone();

        let engine = Self {
            context,
            transport,
            fx,
            inference,
            reporter,
            watchdog,
            atomics: Arc::new(EngineAtomics::new()),
            sidetone,
            sidetone_tap: Some(sidetone_tap),
            dry: vec![0.0; capacity_samples],
            fatal,
            promote_pending,
        };

        if let Some(path) = default_model {
            if !engine.load_model(&path) {
                log::warn!(
                    "[ENGINE] Default model {:?} failed to load, running in pass-through",
                    path
                );
            }
        }

        Ok(engine)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Audio thread
    // ─────────────────────────────────────────────────────────────────────

    /// Process the first `byte_count` bytes of the region in place.
    ///
    /// Returns false when the caller should forward its input unmodified:
    /// invalid size, model loading or absent, or inference failure (the dry
    /// input is restored first).
    pub fn process_packet(&mut self, byte_count: usize) -> bool {
        if self.promote_pending {
            self.promote_pending = false;
            let _ = self.promote_audio_thread();
        }
        let start = Instant::now();

        if byte_count % SAMPLE_SIZE != 0 || byte_count > self.transport.capacity_bytes() {
            log::warn!(
                "[ENGINE] Rejected packet of {} bytes (capacity {})",
                byte_count,
                self.transport.capacity_bytes()
            );
            self.atomics.pass_through.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let converted = self.run_packet(byte_count / SAMPLE_SIZE);
        if !converted {
            self.atomics.pass_through.fetch_add(1, Ordering::Relaxed);
        }

        let latency = start.elapsed();
        self.reporter.post(latency);
        self.atomics.record_latency(latency);
        if latency > self.fatal {
            self.atomics.over_fatal.fetch_add(1, Ordering::Relaxed);
            log::warn!(
                "[ENGINE] Packet latency {:.2} ms exceeded {} ms",
                latency.as_secs_f64() * 1000.0,
                self.fatal.as_millis()
            );
        }
        converted
    }

    fn run_packet(&mut self, count: usize) -> bool {
        let Ok(mut packet) = self.transport.packet(count) else {
            return false;
        };
        let buffer = packet.as_mut_slice();

        if !self.atomics.conversion_enabled() {
            self.fx.low_power_pass(buffer);
            self.sidetone.push(buffer);
            return true;
        }

        let mut inference = match self.inference.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return false,
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
        };
        if !inference.is_ready() {
            return false;
        }

        let dry = &mut self.dry[..count];
        dry.copy_from_slice(buffer);

        self.fx.preprocess(buffer);
        match inference.run_inference(buffer) {
            Ok(()) => {
                drop(inference);
                self.fx.postprocess(buffer);
                self.sidetone.push(buffer);
                true
            }
            Err(e) => {
                buffer.copy_from_slice(dry);
                let failures = self.atomics.inference_failures.fetch_add(1, Ordering::Relaxed);
                if failures == 0 || failures % 1000 == 0 {
                    log::error!("[ENGINE] Inference failed, passing through: {}", e);
                }
                false
            }
        }
    }

    /// Copy `input` in, process, copy the region out to `output`.
    ///
    /// On pass-through `output` receives the unmodified input. If `input`
    /// does not fit the region nothing is copied and false is returned.
    pub fn process(&mut self, input: &[Sample], output: &mut [Sample]) -> bool {
        if let Err(e) = self.transport.write_in(input) {
            log::warn!("[ENGINE] {}", e);
            self.atomics.pass_through.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let converted = self.process_packet(input.len() * SAMPLE_SIZE);
        let len = output.len().min(input.len());
        if let Err(e) = self.transport.read_out(&mut output[..len]) {
            log::warn!("[ENGINE] {}", e);
            return false;
        }
        converted
    }

    /// Elevate the calling (audio) thread to real-time priority.
    ///
    /// Done automatically on the first packet when
    /// `realtime.elevate_priority` is set.
    pub fn promote_audio_thread(&self) -> PinningResult<()> {
        self.context.stability().set_realtime_priority()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Control
    // ─────────────────────────────────────────────────────────────────────

    /// Handle for loading models from another thread
    pub fn model_control(&self) -> ModelControl {
        ModelControl::new(Arc::clone(&self.inference), self.transport.capacity_samples())
    }

    /// Load (hot-swap) a model. Blocks the calling thread for the load.
    pub fn load_model(&self, path: &Path) -> bool {
        self.model_control().load(path)
    }

    /// Conversion on, or the low-power echo + dynamics path
    pub fn set_conversion_enabled(&self, enabled: bool) {
        if self.atomics.conversion_enabled() != enabled {
            log::info!(
                "[ENGINE] Conversion {}",
                if enabled { "enabled" } else { "disabled (low-power pass)" }
            );
        }
        self.atomics.set_conversion_enabled(enabled);
    }

    pub fn stability(&self) -> &Arc<StabilityController> {
        self.context.stability()
    }

    pub fn atomics(&self) -> Arc<EngineAtomics> {
        Arc::clone(&self.atomics)
    }

    pub fn context(&self) -> &EngineContext {
        &self.context
    }

    /// The sidetone consumer; available once
    pub fn take_sidetone_tap(&mut self) -> Option<SidetoneTap> {
        self.sidetone_tap.take()
    }

    /// Shared region transport (the capture side writes through this when
    /// the region is anonymous)
    pub fn transport_mut(&mut self) -> &mut SharedBufferTransport {
        &mut self.transport
    }

    pub fn transport(&self) -> &SharedBufferTransport {
        &self.transport
    }

    /// Write `samples` into the region ahead of `process_packet`
    pub fn write_in(&mut self, samples: &[Sample]) -> TransportResult<()> {
        self.transport.write_in(samples)
    }

    /// Combined pre + post processing latency in samples
    pub fn fx_latency_samples(&self) -> u32 {
        self.fx.latency_samples()
    }

    /// Whether the monitoring loop is running
    pub fn is_watchdog_running(&self) -> bool {
        self.watchdog.is_running()
    }

    /// Latency samples the watchdog queue could not take
    pub fn dropped_latency_samples(&self) -> u64 {
        self.reporter.dropped()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.watchdog.stop();
        log::info!(
            "[ENGINE] Shut down after {} packets ({} pass-through, max latency {:.2} ms)",
            self.atomics.packets(),
            self.atomics.pass_through(),
            self.atomics.max_latency().as_secs_f64() * 1000.0
        );
    }
}
