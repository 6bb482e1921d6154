//! Time of day within a GTFS service day.
//!
//! GTFS writes stop times as `HH:MM:SS` measured from noon minus twelve
//! hours of the service date, so trips running after midnight carry values
//! such as `25:10:00`. Comparing those as strings breaks as soon as a feed
//! omits the zero padding (`8:05:00`), so they are normalized to seconds.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

pub const SECONDS_PER_DAY: u32 = 24 * 60 * 60;

/// Error returned when parsing an invalid GTFS time string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid GTFS time {input:?}: {reason}")]
pub struct TimeParseError {
    input: String,
    reason: &'static str,
}

impl TimeParseError {
    fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_string(),
            reason,
        }
    }
}

/// Seconds since the start of a service day. May exceed one day.
///
/// # Examples
///
/// ```
/// use virtual_monitor::time::ServiceTime;
///
/// let late: ServiceTime = "25:10:00".parse().unwrap();
/// let evening: ServiceTime = "23:50:00".parse().unwrap();
/// assert!(late > evening);
/// assert_eq!(late.to_string(), "25:10:00");
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceTime(u32);

impl ServiceTime {
    pub fn from_seconds(seconds: u32) -> Self {
        Self(seconds)
    }

    pub fn from_hms(hours: u32, minutes: u32, seconds: u32) -> Self {
        Self(hours * 3600 + minutes * 60 + seconds)
    }

    pub fn seconds(self) -> u32 {
        self.0
    }

    /// True for times at or past 24:00:00, i.e. after midnight of the
    /// service date.
    pub fn is_past_midnight(self) -> bool {
        self.0 >= SECONDS_PER_DAY
    }
}

impl FromStr for ServiceTime {
    type Err = TimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut parts = trimmed.split(':');
        let (Some(h), Some(m), Some(sec), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TimeParseError::new(s, "expected H:MM:SS"));
        };

        if h.is_empty() || m.len() != 2 || sec.len() != 2 {
            return Err(TimeParseError::new(s, "expected H:MM:SS"));
        }

        let field = |text: &str| {
            if text.bytes().all(|b| b.is_ascii_digit()) {
                text.parse::<u32>().ok()
            } else {
                None
            }
        };
        let hours = field(h).ok_or_else(|| TimeParseError::new(s, "hours are not a number"))?;
        let minutes = field(m).ok_or_else(|| TimeParseError::new(s, "minutes are not a number"))?;
        let seconds = field(sec).ok_or_else(|| TimeParseError::new(s, "seconds are not a number"))?;

        if minutes >= 60 || seconds >= 60 {
            return Err(TimeParseError::new(s, "minutes and seconds must be below 60"));
        }
        hours
            .checked_mul(3600)
            .and_then(|h| h.checked_add(minutes * 60 + seconds))
            .map(Self)
            .ok_or_else(|| TimeParseError::new(s, "hours out of range"))
    }
}

impl fmt::Display for ServiceTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = self.0 / 3600;
        let minutes = (self.0 % 3600) / 60;
        let seconds = self.0 % 60;
        write!(f, "{hours:02}:{minutes:02}:{seconds:02}")
    }
}

impl Serialize for ServiceTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
