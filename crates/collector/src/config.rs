use std::time::Duration;

/// Runtime tunables for the collector.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Advertised name the data source must announce.
    pub device_name: String,
    /// Fixed delay between discovery passes after a failure or loss.
    pub retry_backoff: Duration,
    /// Rollup tick period in minutes, aligned to wall-clock boundaries.
    pub rollup_period_mins: u32,
    /// Maximum reading age for rollup eligibility.
    pub freshness_window: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            device_name: "Meteodata".to_string(),
            retry_backoff: Duration::from_secs(10),
            rollup_period_mins: 15,
            freshness_window: Duration::from_secs(300),
        }
    }
}
