use std::time::Duration;

/// A point-in-time snapshot of the collector's internal counters.
/// Acquired by calling [`crate::Gc::metrics`].
#[derive(Debug, Clone)]
pub struct GcMetrics {
    /// Collections performed over the engine's lifetime.
    pub collections: u64,
    /// Blocks currently tracked by the registry.
    pub live_allocations: usize,
    /// Bytes currently tracked by the registry.
    pub live_bytes: usize,
    /// Bytes allocated since the pacer was last reset.
    pub bytes_since_reset: usize,
    /// Allocation calls since the pacer was last reset.
    pub calls_since_reset: usize,
    /// Mutator threads currently registered for the stop-the-world
    /// handshake.
    pub registered_threads: usize,
    /// Current byte-volume trigger threshold.
    pub bytes_threshold: usize,
    /// Current call-count trigger threshold.
    pub calls_threshold: usize,
    /// Current worker heartbeat interval.
    pub collect_interval: Duration,
}
