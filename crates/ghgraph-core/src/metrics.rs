//! Global atomic counters.
//!
//! Counters are incremented at the call site. [`Metrics::flush`] emits the
//! current values as one `tracing::info!` event at the end of a run.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    providers_invoked: AtomicU64,
    entities_created: AtomicU64,
    types_discarded: AtomicU64,
    files_derived: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            providers_invoked: AtomicU64::new(0),
            entities_created: AtomicU64::new(0),
            types_discarded: AtomicU64::new(0),
            files_derived: AtomicU64::new(0),
        }
    }

    pub fn inc_providers_invoked(&self) {
        self.providers_invoked.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "providers_invoked", "counter incremented");
    }

    pub fn inc_entities_created(&self) {
        self.entities_created.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "entities_created", "counter incremented");
    }

    pub fn inc_types_discarded(&self) {
        self.types_discarded.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "types_discarded", "counter incremented");
    }

    pub fn inc_files_derived(&self) {
        self.files_derived.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "files_derived", "counter incremented");
    }

    /// Emit all counter values as a single event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            providers_invoked = self.providers_invoked(),
            entities_created = self.entities_created(),
            types_discarded = self.types_discarded(),
            files_derived = self.files_derived(),
        );
    }

    pub fn providers_invoked(&self) -> u64 {
        self.providers_invoked.load(Ordering::Relaxed)
    }

    pub fn entities_created(&self) -> u64 {
        self.entities_created.load(Ordering::Relaxed)
    }

    pub fn types_discarded(&self) -> u64 {
        self.types_discarded.load(Ordering::Relaxed)
    }

    pub fn files_derived(&self) -> u64 {
        self.files_derived.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.providers_invoked.store(0, Ordering::Relaxed);
        self.entities_created.store(0, Ordering::Relaxed);
        self.types_discarded.store(0, Ordering::Relaxed);
        self.files_derived.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_providers_invoked();
        m.inc_providers_invoked();
        m.inc_entities_created();
        m.inc_files_derived();
        assert_eq!(m.providers_invoked(), 2);
        assert_eq!(m.entities_created(), 1);
        assert_eq!(m.types_discarded(), 0);
        assert_eq!(m.files_derived(), 1);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_types_discarded();
        m.inc_entities_created();
        m.reset();
        assert_eq!(m.types_discarded(), 0);
        assert_eq!(m.entities_created(), 0);
    }
}
