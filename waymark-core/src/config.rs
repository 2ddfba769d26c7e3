use serde::{Deserialize, Serialize};

/// Tuning knobs for the tracking subsystem. The app shell builds one at
/// startup and every layer reads the same copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Minimum milliseconds between provider fixes.
    pub min_interval_ms: u64,
    /// Fixes closer than this many meters to the last accepted fix are discarded.
    pub min_distance_m: f64,
    /// Mirror the travel log into the key-value store so it survives restarts.
    pub persist_log: bool,
    /// Store key for the tracking-active flag.
    pub tracking_flag_key: String,
    /// Store key for the last delivered position blob.
    pub last_position_key: String,
    /// Store key for the persisted travel log.
    pub log_key: String,
    /// File name used when exporting the travel log as CSV.
    pub export_file_name: String,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 10_000,
            min_distance_m: 1.0,
            persist_log: false,
            tracking_flag_key: "tracking_active".to_string(),
            last_position_key: "last_position".to_string(),
            log_key: "location_log".to_string(),
            export_file_name: "location_log.csv".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds_match_the_platform_constants() {
        let config = TrackingConfig::default();
        assert_eq!(config.min_interval_ms, 10_000);
        assert_eq!(config.min_distance_m, 1.0);
        assert!(!config.persist_log);
    }
}
