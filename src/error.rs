//! Error taxonomy of the timetable engine.

use chrono::Weekday;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// The calendar has no service running on this weekday. The calendar is
    /// expected to cover every day, so this is a data problem.
    #[error("no service_id in the calendar runs on {weekday}")]
    NoActiveService { weekday: Weekday },

    /// Every trip scheduled for the day has already been returned.
    #[error("no more trips are available for this stop today")]
    NoTripsAvailable,

    #[error("stop code {0:?} does not exist, pass an existing stop code")]
    UnknownStop(String),

    #[error("stop {stop_id:?} has no stop times")]
    EmptyStopTimes { stop_id: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("timetable build cancelled")]
    Cancelled,
}
