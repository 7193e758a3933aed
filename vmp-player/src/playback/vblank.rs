//! Vertical-blank registry
//!
//! Decoder libraries run a micro-step on every vertical blank. The routine
//! is installed lazily, once per backend, the first time a player is built
//! on that backend, and stays installed for the lifetime of the process.
//! Backends are told apart by `Arc` identity.

use crate::decoder::DecoderBackend;
use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

static INSTALLED: Lazy<Mutex<Vec<Arc<dyn DecoderBackend>>>> = Lazy::new(|| Mutex::new(Vec::new()));

fn installed() -> MutexGuard<'static, Vec<Arc<dyn DecoderBackend>>> {
    INSTALLED.lock().unwrap_or_else(|e| e.into_inner())
}

fn same_backend(a: &Arc<dyn DecoderBackend>, b: &Arc<dyn DecoderBackend>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const u8, Arc::as_ptr(b) as *const u8)
}

/// Initialize `backend` and hook its vertical-blank routine
///
/// Returns `false` (and does nothing) when the backend is already installed.
pub fn install(backend: &Arc<dyn DecoderBackend>) -> bool {
    {
        let mut routines = installed();
        if routines.iter().any(|b| same_backend(b, backend)) {
            return false;
        }
        routines.push(Arc::clone(backend));
    }

    backend.initialize();
    info!("Installed vertical-blank routine for decoder '{}'", backend.name());
    true
}

pub fn is_installed(backend: &Arc<dyn DecoderBackend>) -> bool {
    installed().iter().any(|b| same_backend(b, backend))
}

/// Signal one vertical blank; returns the number of routines run
pub fn raise() -> usize {
    let routines: Vec<Arc<dyn DecoderBackend>> = installed().clone();
    for backend in &routines {
        backend.on_vblank();
    }
    routines.len()
}

pub fn installed_count() -> usize {
    installed().len()
}
