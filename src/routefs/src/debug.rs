use std::sync::atomic::{AtomicBool, Ordering};

// Process-wide diagnostic switches.  They only gate log emission; tearing is
// harmless, so all accesses are Relaxed and unsynchronized with the data
// plane.
static DEBUG_MESSAGES: AtomicBool = AtomicBool::new(false);
static ERROR_MESSAGES: AtomicBool = AtomicBool::new(true);
static LOCK_TRACING: AtomicBool = AtomicBool::new(false);

/// Enable or disable debug-level diagnostics.
pub fn set_debug_messages(on: bool) {
    DEBUG_MESSAGES.store(on, Ordering::Relaxed);
}

/// Enable or disable error diagnostics.
pub fn set_error_messages(on: bool) {
    ERROR_MESSAGES.store(on, Ordering::Relaxed);
}

/// Enable or disable per-acquisition lock tracing.  Very noisy.
pub fn set_lock_tracing(on: bool) {
    LOCK_TRACING.store(on, Ordering::Relaxed);
}

pub fn debug_messages() -> bool {
    DEBUG_MESSAGES.load(Ordering::Relaxed)
}

pub fn error_messages() -> bool {
    ERROR_MESSAGES.load(Ordering::Relaxed)
}

pub fn lock_tracing() -> bool {
    LOCK_TRACING.load(Ordering::Relaxed)
}

macro_rules! fs_debug {
    ($($arg:tt)*) => {
        if $crate::debug::debug_messages() {
            log::debug!($($arg)*);
        }
    };
}

macro_rules! fs_error {
    ($($arg:tt)*) => {
        if $crate::debug::error_messages() {
            log::error!($($arg)*);
        }
    };
}

macro_rules! fs_lock_trace {
    ($($arg:tt)*) => {
        if $crate::debug::lock_tracing() {
            log::trace!($($arg)*);
        }
    };
}

pub(crate) use {fs_debug, fs_error, fs_lock_trace};
