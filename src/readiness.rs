use std::{
    sync::{Condvar, Mutex, PoisonError},
    time::{Duration, Instant},
};

/// One-shot gate flipped once the replica holds a complete snapshot.
///
/// The gate starts not ready and, once marked ready, stays ready forever.
#[derive(Debug, Default)]
pub struct ReadinessGate {
    ready: Mutex<bool>,
    condvar: Condvar,
}

impl ReadinessGate {
    /// A gate that is not ready yet.
    pub fn new() -> ReadinessGate {
        ReadinessGate::default()
    }

    /// Whether the gate has been opened.
    pub fn is_ready(&self) -> bool {
        *self.ready.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Flip the gate and release all waiters. Returns `true` if this call flipped it.
    pub fn mark_ready(&self) -> bool {
        let mut ready = self.ready.lock().unwrap_or_else(PoisonError::into_inner);
        let flipped = !*ready;
        *ready = true;
        self.condvar.notify_all();
        flipped
    }

    /// Block until the gate is ready or `timeout` elapses. Returns whether the gate is ready.
    pub fn wait_until_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut ready = self.ready.lock().unwrap_or_else(PoisonError::into_inner);
        while !*ready {
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                // Timeout too large to represent, wait in long steps.
                None => Duration::from_secs(u32::MAX.into()),
            };
            if remaining.is_zero() {
                return false;
            }
            ready = self
                .condvar
                .wait_timeout(ready, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}
