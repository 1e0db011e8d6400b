use std::sync::atomic::{AtomicI32, Ordering};

/// Lock-free active/draining counters driven by thread lifecycle notifications.
///
/// Deactivation always undoes both markers. A deactivation without a preceding drain
/// therefore leaves `draining` one below its previous value until the matching drain
/// bookkeeping catches up; callers reading the counters must tolerate that.
#[derive(Debug, Default)]
pub struct ThreadCounters {
    active: AtomicI32,
    draining: AtomicI32,
}

impl ThreadCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_activated(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_draining(&self) {
        self.draining.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_deactivated(&self) {
        self.draining.fetch_sub(1, Ordering::SeqCst);
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn active(&self) -> i32 {
        self.active.load(Ordering::SeqCst)
    }

    pub fn draining(&self) -> i32 {
        self.draining.load(Ordering::SeqCst)
    }
}
