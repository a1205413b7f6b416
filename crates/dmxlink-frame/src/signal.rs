use std::sync::atomic::{AtomicBool, Ordering};

/// Requests passed from the controller to a running worker.
///
/// Workers poll this between steps, never inside a buffer copy, so a stop
/// request cannot land in the middle of a critical section.
#[derive(Debug, Default)]
pub struct WorkerSignal {
    stop: AtomicBool,
    flush: AtomicBool,
}

impl WorkerSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the worker to return at its next check.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Ask the worker to discard buffered inbound data.
    pub fn request_flush(&self) {
        self.flush.store(true, Ordering::SeqCst);
    }

    /// Consume a pending flush request.
    pub fn take_flush(&self) -> bool {
        self.flush.swap(false, Ordering::SeqCst)
    }
}
