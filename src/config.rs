//! Runtime configuration of the monitor.

use std::time::Duration;

use crate::error::MonitorError;
use crate::realtime::DEFAULT_RETRY_LIMIT;

pub const DEFAULT_STOP_CODE: &str = "MOGI42";
pub const DEFAULT_SCHEDULE_URL: &str = "https://www.ztm.poznan.pl/pl/dla-deweloperow/getGTFSFile";
pub const DEFAULT_TRIP_UPDATES_URL: &str =
    "https://www.ztm.poznan.pl/pl/dla-deweloperow/getGtfsRtFile?file=trip_updates.pb";
pub const DEFAULT_ROWS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Public stop code as printed on the stop (`stop_code` in stops.txt).
    pub stop_code: String,
    /// URL, zip file or directory holding the static GTFS tables.
    pub schedule_source: String,
    pub feed_url: String,
    /// Attempts per real-time fetch.
    pub retry_limit: u32,
    pub rows: usize,
    pub max_feed_age: Option<Duration>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            stop_code: DEFAULT_STOP_CODE.to_string(),
            schedule_source: DEFAULT_SCHEDULE_URL.to_string(),
            feed_url: DEFAULT_TRIP_UPDATES_URL.to_string(),
            retry_limit: DEFAULT_RETRY_LIMIT,
            rows: DEFAULT_ROWS,
            max_feed_age: None,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.stop_code.trim().is_empty() {
            return Err(MonitorError::InvalidConfig(
                "stop code must not be empty".to_string(),
            ));
        }
        if self.retry_limit == 0 {
            return Err(MonitorError::InvalidConfig(
                "retry limit must be at least 1".to_string(),
            ));
        }
        if self.rows == 0 {
            return Err(MonitorError::InvalidConfig(
                "row count must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
