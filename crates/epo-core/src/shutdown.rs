//! Graceful shutdown: atomic flag plus SIGINT/SIGTERM handlers

use std::sync::atomic::{AtomicBool, Ordering};

/// Global shutdown flag — set by the SIGINT/SIGTERM handler
pub fn shutdown_flag() -> &'static AtomicBool {
    static FLAG: AtomicBool = AtomicBool::new(false);
    &FLAG
}

/// Check if shutdown was requested
pub fn is_shutdown_requested() -> bool {
    shutdown_flag().load(Ordering::Relaxed)
}

/// Request shutdown (for signal handlers)
pub fn request_shutdown() {
    shutdown_flag().store(true, Ordering::Relaxed);
}

/// Clear the flag. Test support only; a real process never un-cancels.
pub fn reset_shutdown() {
    shutdown_flag().store(false, Ordering::Relaxed);
}

/// Install SIGINT/SIGTERM handlers.
///
/// First signal: set the graceful shutdown flag.
/// Second signal: force exit with the conventional 130.
/// SAFETY: AtomicBool::swap and process::exit are async-signal-safe.
pub fn install_signal_handlers() {
    unsafe {
        signal_hook::low_level::register(signal_hook::consts::SIGTERM, || {
            if shutdown_flag().swap(true, Ordering::Relaxed) {
                std::process::exit(130);
            }
        })
        .expect("failed to register SIGTERM handler");
        signal_hook::low_level::register(signal_hook::consts::SIGINT, || {
            if shutdown_flag().swap(true, Ordering::Relaxed) {
                std::process::exit(130);
            }
        })
        .expect("failed to register SIGINT handler");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_round_trip() {
        reset_shutdown();
        assert!(!is_shutdown_requested());
        request_shutdown();
        assert!(is_shutdown_requested());
        reset_shutdown();
        assert!(!is_shutdown_requested());
    }
}
