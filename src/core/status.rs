use std::sync::atomic::{AtomicBool, Ordering};

/// Global readiness flag, set once the engine is assembled.
///
/// Read by the readiness probe on the status listener.
static ENGINE_READY: AtomicBool = AtomicBool::new(false);

/// Mark the service as ready to take traffic.
pub fn mark_ready() {
    ENGINE_READY.store(true, Ordering::SeqCst);
    log::info!("Engine assembled, service is ready");
}

pub fn is_ready() -> bool {
    ENGINE_READY.load(Ordering::SeqCst)
}

/// Clear readiness once the server starts draining.
pub fn reset() {
    ENGINE_READY.store(false, Ordering::SeqCst);
    log::debug!("Readiness status reset");
}
