//! In-memory schedule for the monitored stop.
//!
//! A [`ScheduleCatalog`] is built once per schedule refresh and never
//! mutated afterwards. [`CatalogHandle`] publishes the current catalog to
//! readers; a refresh swaps in a whole new `Arc` so a build that already
//! holds the previous one keeps reading a consistent version.

pub mod loader;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use chrono::{NaiveDate, Weekday};

use crate::error::MonitorError;
use crate::time::ServiceTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopTime {
    pub trip_id: String,
    pub arrival_time: ServiceTime,
    pub stop_sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trip {
    pub trip_id: String,
    pub service_id: String,
    pub route_id: String,
    pub headsign: Option<String>,
    pub wheelchair_accessible: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Weekdays {
    pub monday: bool,
    pub tuesday: bool,
    pub wednesday: bool,
    pub thursday: bool,
    pub friday: bool,
    pub saturday: bool,
    pub sunday: bool,
}

impl Weekdays {
    pub fn all() -> Self {
        Self {
            monday: true,
            tuesday: true,
            wednesday: true,
            thursday: true,
            friday: true,
            saturday: true,
            sunday: true,
        }
    }

    pub fn includes(&self, weekday: Weekday) -> bool {
        match weekday {
            Weekday::Mon => self.monday,
            Weekday::Tue => self.tuesday,
            Weekday::Wed => self.wednesday,
            Weekday::Thu => self.thursday,
            Weekday::Fri => self.friday,
            Weekday::Sat => self.saturday,
            Weekday::Sun => self.sunday,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEntry {
    pub service_id: String,
    pub days: Weekdays,
}

#[derive(Debug, Clone)]
pub struct ScheduleCatalog {
    stop_id: String,
    /// Sorted ascending by arrival time; ties keep load order.
    stop_times: Vec<StopTime>,
    trips: HashMap<String, Trip>,
    calendar: Vec<CalendarEntry>,
    /// Date the calendar's validity ranges were filtered for, if any.
    service_date: Option<NaiveDate>,
}

impl ScheduleCatalog {
    /// Builds a catalog for `stop_id`.
    ///
    /// Stop times are sorted by arrival and trips that never call at the stop
    /// are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::EmptyStopTimes`] if `stop_times` is empty.
    pub fn new(
        stop_id: impl Into<String>,
        mut stop_times: Vec<StopTime>,
        trips: impl IntoIterator<Item = Trip>,
        calendar: Vec<CalendarEntry>,
    ) -> Result<Self, MonitorError> {
        let stop_id = stop_id.into();
        if stop_times.is_empty() {
            return Err(MonitorError::EmptyStopTimes { stop_id });
        }
        stop_times.sort_by_key(|st| st.arrival_time);

        let calling: HashSet<&str> = stop_times.iter().map(|st| st.trip_id.as_str()).collect();
        let trips = trips
            .into_iter()
            .filter(|trip| calling.contains(trip.trip_id.as_str()))
            .map(|trip| (trip.trip_id.clone(), trip))
            .collect();

        Ok(Self {
            stop_id,
            stop_times,
            trips,
            calendar,
            service_date: None,
        })
    }

    /// Marks the catalog as filtered for `date`.
    pub fn with_service_date(mut self, date: NaiveDate) -> Self {
        self.service_date = Some(date);
        self
    }

    pub fn service_date(&self) -> Option<NaiveDate> {
        self.service_date
    }

    pub fn stop_id(&self) -> &str {
        &self.stop_id
    }

    pub fn stop_times(&self) -> &[StopTime] {
        &self.stop_times
    }

    pub fn trip(&self, trip_id: &str) -> Option<&Trip> {
        self.trips.get(trip_id)
    }

    pub fn trips(&self) -> impl Iterator<Item = &Trip> {
        self.trips.values()
    }

    pub fn calendar(&self) -> &[CalendarEntry] {
        &self.calendar
    }
}

/// Shared, atomically replaceable reference to the current catalog.
#[derive(Debug)]
pub struct CatalogHandle {
    current: RwLock<Arc<ScheduleCatalog>>,
}

impl CatalogHandle {
    pub fn new(catalog: ScheduleCatalog) -> Self {
        Self {
            current: RwLock::new(Arc::new(catalog)),
        }
    }

    /// Returns the catalog published at the time of the call.
    pub fn current(&self) -> Arc<ScheduleCatalog> {
        // The lock only guards an Arc clone or swap, so a poisoned lock still
        // holds a complete catalog.
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Publishes `catalog`, returning the one it replaced.
    pub fn replace(&self, catalog: ScheduleCatalog) -> Arc<ScheduleCatalog> {
        let next = Arc::new(catalog);
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, next)
    }
}
