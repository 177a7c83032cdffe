//! Stability controller - real-time scheduling, page locking, degrade/restore
//!
//! The controller is created once per engine and shared through
//! [`EngineContext`](crate::engine::EngineContext) as an `Arc`. Two locks
//! guard it:
//!
//! - `state`: the [`EngineState`] read by the audio path on every packet and
//!   written by the watchdog. Critical sections are a handful of loads/stores.
//! - `setup`: serializes the one-shot scheduling / mlock calls so they never
//!   contend with steady-state reads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::error::{PinningError, PinningResult};
use super::state::{EngineState, Precision, StabilityMode};

/// Real-time scheduling guarantees and the degrade/restore state machine
pub struct StabilityController {
    state: Mutex<EngineState>,
    setup: Mutex<()>,
    /// Precision entered on degradation (Half unless configured otherwise)
    degraded_precision: Precision,
    /// Number of committed Normal <-> Degraded transitions
    transitions: AtomicU64,
}

impl StabilityController {
    /// Create a controller that degrades to half precision
    pub fn new() -> Self {
        Self::with_degraded_precision(Precision::Half)
    }

    /// Create a controller with a custom degraded precision.
    ///
    /// `Precision::Full` is not a degradation and is coerced to `Half`.
    pub fn with_degraded_precision(precision: Precision) -> Self {
        let degraded_precision = if precision == Precision::Full {
            log::warn!("[STABILITY] Full is not a degraded precision, using Half");
            Precision::Half
        } else {
            precision
        };
        Self {
            state: Mutex::new(EngineState::INITIAL),
            setup: Mutex::new(()),
            degraded_precision,
            transitions: AtomicU64::new(0),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        // State is plain-old-data: a poisoned lock still holds a valid value
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Scheduling and memory
    // ─────────────────────────────────────────────────────────────────────

    /// Request SCHED_FIFO at maximum priority for the calling thread.
    ///
    /// Failure is returned for logging only; the thread keeps its default
    /// scheduling class.
    pub fn set_realtime_priority(&self) -> PinningResult<()> {
        let _guard = self.setup.lock().unwrap_or_else(|e| e.into_inner());
        match sys::elevate_current_thread() {
            Ok(priority) => {
                log::info!("[STABILITY] Thread locked to SCHED_FIFO (priority {})", priority);
                Ok(())
            }
            Err(e) => {
                log::warn!("[STABILITY] {} - continuing with default scheduling", e);
                Err(e)
            }
        }
    }

    /// Drop the calling thread to the default time-sharing class.
    ///
    /// Threads inherit the scheduling class of their creator, so helper
    /// threads spawned from an elevated thread call this before their loop
    /// to stay below the audio thread.
    pub fn set_background_priority(&self) -> PinningResult<()> {
        match sys::demote_current_thread() {
            Ok(()) => {
                log::debug!("[STABILITY] Thread running with default scheduling");
                Ok(())
            }
            Err(e) => {
                log::warn!("[STABILITY] {}", e);
                Err(e)
            }
        }
    }

    /// Pin a memory range in physical RAM so it is never paged out.
    ///
    /// Best-effort: failure is logged and returned, never fatal.
    pub fn pin_memory(&self, bytes: &[u8]) -> PinningResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let _guard = self.setup.lock().unwrap_or_else(|e| e.into_inner());
        match sys::lock_pages(bytes) {
            Ok(()) => {
                log::info!(
                    "[STABILITY] Locked {} bytes at {:p} in physical memory",
                    bytes.len(),
                    bytes.as_ptr()
                );
                Ok(())
            }
            Err(e) => {
                log::warn!("[STABILITY] {} - region may be paged out", e);
                Err(e)
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Degrade / restore
    // ─────────────────────────────────────────────────────────────────────

    /// Normal → Degraded: reduced precision plus packet-loss concealment.
    ///
    /// Idempotent. Returns true if a transition happened.
    pub fn force_degradation(&self) -> bool {
        let mut state = self.lock_state();
        if state.degraded {
            return false;
        }
        *state = EngineState::degraded(self.degraded_precision);
        drop(state);

        self.transitions.fetch_add(1, Ordering::Relaxed);
        log::warn!(
            "[STABILITY] Degradation engaged ({} + concealment) to hold the latency budget",
            self.degraded_precision.name()
        );
        true
    }

    /// Degraded → Normal. Idempotent. Returns true if a transition happened.
    pub fn restore_performance(&self) -> bool {
        let mut state = self.lock_state();
        if !state.degraded {
            return false;
        }
        *state = EngineState::INITIAL;
        drop(state);

        self.transitions.fetch_add(1, Ordering::Relaxed);
        log::info!("[STABILITY] Stability restored, back to full precision");
        true
    }

    /// Snapshot of the latest committed state
    #[inline]
    pub fn state(&self) -> EngineState {
        *self.lock_state()
    }

    /// Current state machine mode
    pub fn mode(&self) -> StabilityMode {
        self.state().mode()
    }

    /// Whether degraded mode is active
    pub fn is_degraded(&self) -> bool {
        self.state().degraded
    }

    /// Whether packet-loss concealment is active
    pub fn is_concealment_active(&self) -> bool {
        self.state().concealment_active
    }

    /// Current inference precision
    pub fn precision(&self) -> Precision {
        self.state().precision
    }

    /// Precision used while degraded
    pub fn degraded_precision(&self) -> Precision {
        self.degraded_precision
    }

    /// Number of committed transitions since creation
    pub fn transitions(&self) -> u64 {
        self.transitions.load(Ordering::Relaxed)
    }
}

impl Default for StabilityController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
mod sys {
    use std::io;

    use super::PinningError;

    /// SCHED_FIFO at max priority for the calling thread, returns the priority
    pub(super) fn elevate_current_thread() -> Result<i32, PinningError> {
        // SAFETY: plain libc calls on the current thread with a zeroed,
        // fully initialized sched_param
        unsafe {
            let max = libc::sched_get_priority_max(libc::SCHED_FIFO);
            if max == -1 {
                return Err(PinningError::Priority(format!(
                    "cannot query SCHED_FIFO max priority: {}",
                    io::Error::last_os_error()
                )));
            }
            let mut param: libc::sched_param = std::mem::zeroed();
            param.sched_priority = max;
            let rc = libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param);
            if rc != 0 {
                return Err(PinningError::Priority(format!(
                    "SCHED_FIFO priority {} refused: {}",
                    max,
                    io::Error::from_raw_os_error(rc)
                )));
            }
            Ok(max)
        }
    }

    pub(super) fn demote_current_thread() -> Result<(), PinningError> {
        // SAFETY: as above; SCHED_OTHER only accepts priority 0
        let rc = unsafe {
            let param: libc::sched_param = std::mem::zeroed();
            libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_OTHER, &param)
        };
        if rc == 0 {
            Ok(())
        } else {
            Err(PinningError::Priority(format!(
                "SCHED_OTHER refused: {}",
                io::Error::from_raw_os_error(rc)
            )))
        }
    }

    pub(super) fn lock_pages(bytes: &[u8]) -> Result<(), PinningError> {
        // SAFETY: the range is a live borrowed slice for the duration of the call
        let rc = unsafe { libc::mlock(bytes.as_ptr() as *const libc::c_void, bytes.len()) };
        if rc == 0 {
            Ok(())
        } else {
            Err(PinningError::Lock {
                len: bytes.len(),
                reason: io::Error::last_os_error().to_string(),
            })
        }
    }
}

#[cfg(not(unix))]
mod sys {
    use super::PinningError;

    pub(super) fn elevate_current_thread() -> Result<i32, PinningError> {
        Err(PinningError::Unsupported("SCHED_FIFO"))
    }

    pub(super) fn demote_current_thread() -> Result<(), PinningError> {
        Ok(())
    }

    pub(super) fn lock_pages(_bytes: &[u8]) -> Result<(), PinningError> {
        Err(PinningError::Unsupported("mlock"))
    }
}

/// Scheduling policy and priority of a thread, for tests
#[cfg(all(test, unix))]
pub(crate) fn scheduling_of(thread: libc::pthread_t) -> (i32, i32) {
    let mut policy = 0;
    // SAFETY: `thread` is a live joinable thread owned by the caller
    let param = unsafe {
        let mut param: libc::sched_param = std::mem::zeroed();
        libc::pthread_getschedparam(thread, &mut policy, &mut param);
        param
    };
    (policy, param.sched_priority)
}
