//! C ABI entry points for native callers.
//!
//! The host installs a [`SpawnRequestHandler`] at startup and uninstalls it
//! at shutdown. Telemetry follows the same lifecycle: its guard is parked
//! here, flushed on uninstall and shut down on `modhelper_shutdown_telemetry`.
//! Nothing here ever unwinds or returns an error across the boundary:
//! failures are logged, and the entry points that can fail report a `bool`.

use std::ffi::{CStr, c_char};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error, warn};

use crate::config::Config;
use crate::dispatch::panic_message;
use crate::error::Result;
use crate::spawn::SpawnRequestHandler;
use crate::telemetry::{TelemetryConfig, TelemetryGuard, init_telemetry};

static HANDLER: Mutex<Option<Arc<SpawnRequestHandler>>> = Mutex::new(None);
static TELEMETRY: Mutex<Option<TelemetryGuard>> = Mutex::new(None);

/// Make `handler` the target of the C entry points. Returns the handler it
/// replaced, if any.
pub fn install(handler: Arc<SpawnRequestHandler>) -> Option<Arc<SpawnRequestHandler>> {
    HANDLER
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .replace(handler)
}

/// Detach the installed handler and flush any parked telemetry.
pub fn uninstall() -> Option<Arc<SpawnRequestHandler>> {
    let handler = HANDLER.lock().unwrap_or_else(PoisonError::into_inner).take();
    if let Some(guard) = TELEMETRY
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
    {
        guard.force_flush();
    }
    handler
}

/// Park a telemetry guard for the lifetime of the loaded library. Returns
/// the guard it replaced, if any.
pub fn install_telemetry(guard: TelemetryGuard) -> Option<TelemetryGuard> {
    TELEMETRY
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .replace(guard)
}

pub fn has_telemetry() -> bool {
    TELEMETRY
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .is_some()
}

fn init_telemetry_from_env() -> Result<()> {
    let config = Config::from_env()?;
    let guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint,
        service_name: "modhelper".to_string(),
        log_level: config.log_level,
    })?;
    debug!(
        owns_subscriber = guard.owns_subscriber(),
        exports = guard.exports(),
        "telemetry initialized"
    );
    install_telemetry(guard);
    Ok(())
}

pub fn is_installed() -> bool {
    installed().is_some()
}

fn installed() -> Option<Arc<SpawnRequestHandler>> {
    HANDLER.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Queue a spawn of the template at `path`.
///
/// # Safety
///
/// `path` must be null or point to a NUL-terminated string that stays valid
/// for the duration of the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn modhelper_spawn_interactable(
    path: *const c_char,
    x: f32,
    y: f32,
    z: f32,
) {
    let Some(handler) = installed() else {
        error!("spawn helper not initialized");
        return;
    };
    if path.is_null() {
        error!("null resource path provided");
        return;
    }

    // SAFETY: non-null, and the caller guarantees NUL termination and lifetime.
    let raw = unsafe { CStr::from_ptr(path) };
    let resource = match raw.to_str() {
        Ok(resource) => resource,
        Err(e) => {
            error!(error = %e, "resource path is not valid UTF-8");
            return;
        }
    };

    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler.spawn(resource, x, y, z)))
    {
        error!(panic = %panic_message(&*payload), "spawn call panicked");
    }
}

/// Tear down the installed handler's dispatcher.
///
/// Returns `false` when nothing is installed or the teardown failed.
#[unsafe(no_mangle)]
pub extern "C" fn modhelper_cleanup() -> bool {
    let Some(handler) = installed() else {
        warn!("cleanup called before the spawn helper was initialized");
        return false;
    };

    match panic::catch_unwind(AssertUnwindSafe(|| handler.cleanup())) {
        Ok(success) => success,
        Err(payload) => {
            error!(panic = %panic_message(&*payload), "cleanup call panicked");
            false
        }
    }
}

/// Set up logging from the environment. Safe to call more than once; a
/// subscriber the host already installed is left alone.
///
/// Returns `false` when the configuration is invalid or an exporter could
/// not be built.
#[unsafe(no_mangle)]
pub extern "C" fn modhelper_init_telemetry() -> bool {
    if has_telemetry() {
        return true;
    }
    match panic::catch_unwind(init_telemetry_from_env) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            eprintln!("modhelper: telemetry init failed: {e}");
            false
        }
        Err(payload) => {
            eprintln!("modhelper: telemetry init panicked: {}", panic_message(&*payload));
            false
        }
    }
}

/// Flush and shut down telemetry started by `modhelper_init_telemetry`.
#[unsafe(no_mangle)]
pub extern "C" fn modhelper_shutdown_telemetry() {
    let guard = TELEMETRY.lock().unwrap_or_else(PoisonError::into_inner).take();
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || drop(guard))) {
        eprintln!("modhelper: telemetry shutdown panicked: {}", panic_message(&*payload));
    }
}
