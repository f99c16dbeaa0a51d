use chrono::NaiveDateTime;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    /// Aggregation interval must be a positive number of minutes.
    #[error("invalid aggregation interval: {0} minutes")]
    InvalidInterval(i64),

    /// A market insight is write-once per (timestamp, interval).
    #[error("insight already recorded for {timestamp} at {interval_minutes} min")]
    DuplicateInsight {
        timestamp: NaiveDateTime,
        interval_minutes: u32,
    },
}
