//! Injectable clock.
//!
//! A [`Moment`] is captured once per timetable build so that every
//! resolution within that build sees the same weekday and time of day.

use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone, Timelike, Weekday};

use crate::time::ServiceTime;

/// A point in time as seen by the timetable engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Moment {
    pub date: NaiveDate,
    pub weekday: Weekday,
    pub time: ServiceTime,
    pub unix_seconds: i64,
}

impl Moment {
    pub fn from_datetime<Tz: TimeZone>(dt: &DateTime<Tz>) -> Self {
        Self {
            date: dt.date_naive(),
            weekday: dt.weekday(),
            time: ServiceTime::from_seconds(dt.num_seconds_from_midnight()),
            unix_seconds: dt.timestamp(),
        }
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> Moment;
}

/// Wall clock in the host's local time zone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Moment {
        Moment::from_datetime(&Local::now())
    }
}

/// Always reports the same moment.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Moment);

impl FixedClock {
    pub fn at<Tz: TimeZone>(dt: &DateTime<Tz>) -> Self {
        Self(Moment::from_datetime(dt))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Moment {
        self.0
    }
}
