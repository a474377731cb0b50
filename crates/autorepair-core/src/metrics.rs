//! Global atomic counters for repair sessions.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single `tracing::info!`
//! event, normally once at the end of a session.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    oracle_calls: AtomicU64,
    oracle_failures: AtomicU64,
    patches_applied: AtomicU64,
    files_restored: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            oracle_calls: AtomicU64::new(0),
            oracle_failures: AtomicU64::new(0),
            patches_applied: AtomicU64::new(0),
            files_restored: AtomicU64::new(0),
        }
    }

    /// One logical oracle request (retries inside the call are not counted).
    pub fn inc_oracle_calls(&self) {
        self.oracle_calls.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "oracle_calls", "counter incremented");
    }

    /// An oracle request that still failed after its retries.
    pub fn inc_oracle_failures(&self) {
        self.oracle_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "oracle_failures", "counter incremented");
    }

    pub fn inc_patches_applied(&self) {
        self.patches_applied.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "patches_applied", "counter incremented");
    }

    pub fn inc_files_restored(&self) {
        self.files_restored.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "files_restored", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            oracle_calls = self.oracle_calls(),
            oracle_failures = self.oracle_failures(),
            patches_applied = self.patches_applied(),
            files_restored = self.files_restored(),
        );
    }

    pub fn oracle_calls(&self) -> u64 {
        self.oracle_calls.load(Ordering::Relaxed)
    }

    pub fn oracle_failures(&self) -> u64 {
        self.oracle_failures.load(Ordering::Relaxed)
    }

    pub fn patches_applied(&self) -> u64 {
        self.patches_applied.load(Ordering::Relaxed)
    }

    pub fn files_restored(&self) -> u64 {
        self.files_restored.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.oracle_calls.store(0, Ordering::Relaxed);
        self.oracle_failures.store(0, Ordering::Relaxed);
        self.patches_applied.store(0, Ordering::Relaxed);
        self.files_restored.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_oracle_calls();
        m.inc_oracle_calls();
        m.inc_oracle_failures();
        m.inc_patches_applied();
        m.inc_files_restored();
        m.inc_files_restored();
        m.inc_files_restored();

        assert_eq!(m.oracle_calls(), 2);
        assert_eq!(m.oracle_failures(), 1);
        assert_eq!(m.patches_applied(), 1);
        assert_eq!(m.files_restored(), 3);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_oracle_calls();
        m.inc_patches_applied();
        m.reset();
        assert_eq!(m.oracle_calls(), 0);
        assert_eq!(m.patches_applied(), 0);
    }
}
