use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use crate::config::GcConfig;

// The pacer decides whether current allocation pressure justifies a
// collection. Two signals feed the decision: cumulative volume since the
// last reset (bytes and calls, each measured against its threshold), and a
// burst detector comparing the instantaneous allocation rate against an
// exponentially weighted moving average of past rates. The ratio test
// produces the steady-state trigger; the peak test catches sudden bursts
// long before the cumulative totals reach a threshold.
pub(crate) struct Pacer {
    bytes_threshold: AtomicUsize,
    calls_threshold: AtomicUsize,

    alpha: f64,
    peak_factor: f64,
    update_frequency: usize,

    stats: Mutex<PacerStats>,
}

struct PacerStats {
    total_bytes: usize,
    total_calls: usize,

    accumulated_bytes: usize,
    accumulated_calls: usize,
    accumulation_count: usize,

    instantaneous_rate_bytes: f64,
    instantaneous_rate_calls: f64,
    smoothed_rate_bytes: f64,
    smoothed_rate_calls: f64,

    last_update_time: Instant,
}

impl PacerStats {
    fn new() -> Self {
        PacerStats {
            total_bytes: 0,
            total_calls: 0,
            accumulated_bytes: 0,
            accumulated_calls: 0,
            accumulation_count: 0,
            instantaneous_rate_bytes: 0.0,
            instantaneous_rate_calls: 0.0,
            smoothed_rate_bytes: 0.0,
            smoothed_rate_calls: 0.0,
            last_update_time: Instant::now(),
        }
    }
}

impl Pacer {
    pub fn new(config: &GcConfig) -> Self {
        Pacer {
            bytes_threshold: AtomicUsize::new(config.bytes_threshold),
            calls_threshold: AtomicUsize::new(config.calls_threshold),
            alpha: config.pacer_alpha,
            peak_factor: config.pacer_peak_factor,
            update_frequency: config.pacer_update_frequency,
            stats: Mutex::new(PacerStats::new()),
        }
    }

    /// Record an allocation. Every `update_frequency`-th call folds the
    /// accumulated volume into a fresh rate sample.
    pub fn update(&self, bytes: usize, calls: usize) {
        let mut stats = self.stats.lock().unwrap();

        stats.total_bytes += bytes;
        stats.accumulated_bytes += bytes;
        stats.total_calls += calls;
        stats.accumulated_calls += calls;
        stats.accumulation_count += 1;

        if stats.accumulation_count < self.update_frequency {
            return;
        }

        let now = Instant::now();
        // A sub-millisecond batch divides by zero and saturates the
        // instantaneous rates to infinity, which reads as a burst below.
        let elapsed_ms = now.duration_since(stats.last_update_time).as_millis() as f64;

        stats.instantaneous_rate_bytes = stats.accumulated_bytes as f64 * 1000.0 / elapsed_ms;
        stats.instantaneous_rate_calls = stats.accumulated_calls as f64 * 1000.0 / elapsed_ms;

        stats.smoothed_rate_bytes = self.alpha * stats.instantaneous_rate_bytes
            + (1.0 - self.alpha) * stats.smoothed_rate_bytes;
        stats.smoothed_rate_calls = self.alpha * stats.instantaneous_rate_calls
            + (1.0 - self.alpha) * stats.smoothed_rate_calls;

        stats.last_update_time = now;
        stats.accumulation_count = 0;
        stats.accumulated_bytes = 0;
        stats.accumulated_calls = 0;
    }

    pub fn should_trigger(&self) -> bool {
        let stats = self.stats.lock().unwrap();

        let ratio_bytes =
            stats.total_bytes as f64 / self.bytes_threshold.load(Ordering::Relaxed) as f64;
        let ratio_calls =
            stats.total_calls as f64 / self.calls_threshold.load(Ordering::Relaxed) as f64;
        let regular_trigger = ratio_bytes.max(ratio_calls) >= 1.0;

        let peak_trigger = stats.instantaneous_rate_bytes
            > self.peak_factor * stats.smoothed_rate_bytes
            || stats.instantaneous_rate_calls > self.peak_factor * stats.smoothed_rate_calls;

        regular_trigger || peak_trigger
    }

    /// Forget everything recorded so far. The next `should_trigger` depends
    /// only on allocations after this call.
    pub fn reset(&self) {
        let mut stats = self.stats.lock().unwrap();
        *stats = PacerStats::new();
    }

    pub fn bytes_threshold(&self) -> usize {
        self.bytes_threshold.load(Ordering::Relaxed)
    }

    pub fn set_bytes_threshold(&self, bytes: usize) {
        self.bytes_threshold.store(bytes, Ordering::Relaxed);
    }

    pub fn calls_threshold(&self) -> usize {
        self.calls_threshold.load(Ordering::Relaxed)
    }

    pub fn set_calls_threshold(&self, calls: usize) {
        self.calls_threshold.store(calls, Ordering::Relaxed);
    }

    /// Volume recorded since the last reset, as `(bytes, calls)`.
    pub fn totals(&self) -> (usize, usize) {
        let stats = self.stats.lock().unwrap();
        (stats.total_bytes, stats.total_calls)
    }
}
