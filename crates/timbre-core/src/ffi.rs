//! C ABI for the capture layer
//!
//! A narrow, handle-based surface with primitive arguments only. Every entry
//! point catches panics so nothing unwinds into the host; a panic is logged
//! and turned into the function's failure value.
//!
//! ```c
//! EngineHandle *h = timbre_engine_initialize(fd, 65536);
//! timbre_engine_load_model(h, "/models/voice.tflite");
//! // per packet, after writing `n` bytes of f32 samples into the region:
//! bool converted = timbre_engine_process_packet(h, n);
//! timbre_engine_destroy(h);
//! ```

use std::ffi::{c_char, c_int, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::ptr;
use std::sync::{Arc, Mutex};

use crate::config::{default_config_path, load_config};
use crate::engine::{Engine, EngineAtomics, EngineResult, ModelControl};
use crate::inference::panic_message;
use crate::transport::{SharedRegion, TransportError};

/// Opaque engine handle owned by the host
pub struct EngineHandle {
    /// Only the audio thread locks this, so it is uncontended
    engine: Mutex<Engine>,
    models: ModelControl,
    atomics: Arc<EngineAtomics>,
}

/// Catch a panic at the boundary, returning `default` instead
fn guard_with_default<T>(op: &'static str, default: T, f: impl FnOnce() -> T) -> T {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(payload) => {
            log::error!("[FFI] panic in `{}`: {}", op, panic_message(payload));
            default
        }
    }
}

#[cfg(unix)]
fn region_from_fd(fd: c_int, capacity: usize) -> EngineResult<SharedRegion> {
    use std::fs::File;
    use std::os::unix::io::FromRawFd;

    // the host keeps ownership of `fd`; map through a private duplicate
    let owned = unsafe { libc::dup(fd) };
    if owned < 0 {
        return Err(TransportError::Mapping {
            capacity,
            reason: format!("dup({}) failed: {}", fd, std::io::Error::last_os_error()),
        }
        .into());
    }
    // SAFETY: `owned` is a fresh descriptor nothing else refers to
    let file = unsafe { File::from_raw_fd(owned) };
    Ok(SharedRegion::from_file(&file, capacity)?)
}

#[cfg(not(unix))]
fn region_from_fd(_fd: c_int, capacity: usize) -> EngineResult<SharedRegion> {
    Err(TransportError::Mapping {
        capacity,
        reason: "file descriptor regions require unix".into(),
    }
    .into())
}

fn initialize(fd: c_int, capacity: usize) -> EngineResult<EngineHandle> {
    let mut config = load_config(&default_config_path());
    config.region_bytes = capacity;

    let region = if fd < 0 {
        SharedRegion::anonymous(capacity)?
    } else {
        region_from_fd(fd, capacity)?
    };

    let engine = Engine::initialize(config, region)?;
    Ok(EngineHandle {
        models: engine.model_control(),
        atomics: engine.atomics(),
        engine: Mutex::new(engine),
    })
}

/// Create an engine over a shared region of `capacity` bytes.
///
/// `fd` is a shared-memory file descriptor owned by the caller (it is
/// duplicated, not consumed); a negative `fd` maps an anonymous region.
/// Returns null on failure.
#[no_mangle]
pub extern "C" fn timbre_engine_initialize(fd: c_int, capacity: usize) -> *mut EngineHandle {
    guard_with_default("timbre_engine_initialize", ptr::null_mut(), || {
        match initialize(fd, capacity) {
            Ok(handle) => Box::into_raw(Box::new(handle)),
            Err(e) => {
                log::error!("[FFI] Engine initialization failed: {}", e);
                ptr::null_mut()
            }
        }
    })
}

/// Process `byte_count` bytes of the region in place.
///
/// Returns false when the host should forward its input unmodified.
///
/// # Safety
/// `handle` must be null or a live pointer from [`timbre_engine_initialize`].
#[no_mangle]
pub unsafe extern "C" fn timbre_engine_process_packet(
    handle: *const EngineHandle,
    byte_count: usize,
) -> bool {
    guard_with_default("timbre_engine_process_packet", false, || {
        let Some(handle) = (unsafe { handle.as_ref() }) else {
            return false;
        };
        let mut engine = handle.engine.lock().unwrap_or_else(|e| e.into_inner());
        engine.process_packet(byte_count)
    })
}

/// Enable conversion, or fall back to the low-power echo + dynamics path.
///
/// # Safety
/// `handle` must be null or a live pointer from [`timbre_engine_initialize`].
#[no_mangle]
pub unsafe extern "C" fn timbre_engine_set_conversion(handle: *const EngineHandle, enabled: bool) {
    guard_with_default("timbre_engine_set_conversion", (), || {
        if let Some(handle) = unsafe { handle.as_ref() } {
            handle.atomics.set_conversion_enabled(enabled);
            log::info!("[FFI] Conversion enabled: {}", enabled);
        }
    })
}

/// Load (hot-swap) a model from a NUL-terminated UTF-8 path.
///
/// Blocks the calling thread for the duration of the load; call it from a
/// control thread, never the audio thread.
///
/// # Safety
/// `handle` must be null or a live pointer from [`timbre_engine_initialize`];
/// `path` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn timbre_engine_load_model(
    handle: *const EngineHandle,
    path: *const c_char,
) -> bool {
    guard_with_default("timbre_engine_load_model", false, || {
        let Some(handle) = (unsafe { handle.as_ref() }) else {
            return false;
        };
        if path.is_null() {
            return false;
        }
        let path = match unsafe { CStr::from_ptr(path) }.to_str() {
            Ok(path) => path,
            Err(e) => {
                log::error!("[FFI] Model path is not UTF-8: {}", e);
                return false;
            }
        };
        handle.models.load(Path::new(path))
    })
}

/// Tear down the engine and unmap the region. Null is ignored.
///
/// # Safety
/// `handle` must be null or a pointer from [`timbre_engine_initialize`] that
/// has not already been destroyed.
#[no_mangle]
pub unsafe extern "C" fn timbre_engine_destroy(handle: *mut EngineHandle) {
    guard_with_default("timbre_engine_destroy", (), || {
        if !handle.is_null() {
            drop(unsafe { Box::from_raw(handle) });
        }
    })
}
