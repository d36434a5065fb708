use std::time::Duration;

/// Tuning knobs for the collector.
///
/// Passed to [`crate::Gc::with_config`]. Thresholds and the collection
/// interval can also be adjusted on a live engine; the pacer smoothing
/// parameters are fixed at construction.
#[derive(Copy, Clone, Debug)]
pub struct GcConfig {
    // Cumulative allocated bytes since the last collection that will
    // trigger the next one.
    pub bytes_threshold: usize,
    // Cumulative allocation calls since the last collection that will
    // trigger the next one.
    pub calls_threshold: usize,

    // Smoothing factor for the exponentially weighted allocation rate.
    pub pacer_alpha: f64,
    // An instantaneous rate above pacer_peak_factor times the smoothed rate
    // counts as an allocation burst and triggers a collection.
    pub pacer_peak_factor: f64,
    // How many allocation calls are folded into one rate sample.
    pub pacer_update_frequency: usize,

    // The scheduler worker wakes up and collects at least this often.
    pub collect_interval: Duration,
    // Whether the background scheduler collects on its own. When false the
    // worker still runs and serves explicit collection requests.
    pub auto_collect: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        GcConfig {
            bytes_threshold: 1024 * 1024,
            calls_threshold: 1000,
            pacer_alpha: 0.2,
            pacer_peak_factor: 2.0,
            pacer_update_frequency: 20,
            collect_interval: Duration::from_millis(100),
            auto_collect: true,
        }
    }
}
