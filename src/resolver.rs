//! Next departure at the monitored stop.

use std::collections::HashSet;

use crate::catalog::{ScheduleCatalog, StopTime};
use crate::clock::Moment;
use crate::error::MonitorError;

/// Trip ids already returned by the current build, in emission order.
///
/// Lives only for the duration of one build.
#[derive(Debug, Default, Clone)]
pub struct ExclusionSet {
    order: Vec<String>,
    members: HashSet<String>,
}

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if `trip_id` was already excluded.
    pub fn insert(&mut self, trip_id: &str) -> bool {
        if !self.members.insert(trip_id.to_string()) {
            return false;
        }
        self.order.push(trip_id.to_string());
        true
    }

    pub fn contains(&self, trip_id: &str) -> bool {
        self.members.contains(trip_id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Departure<'a> {
    pub stop_time: &'a StopTime,
    /// Nothing was left today, so this is the first departure of the next
    /// service day.
    pub next_day: bool,
}

/// Finds the first departure at or after `moment.time` among `active` trips
/// not in `excluded`, wrapping to the earliest one when the day is over.
///
/// # Errors
///
/// [`MonitorError::NoTripsAvailable`] once every active trip is excluded.
pub fn next_departure<'a>(
    catalog: &'a ScheduleCatalog,
    active: &HashSet<&str>,
    excluded: &ExclusionSet,
    moment: &Moment,
) -> Result<Departure<'a>, MonitorError> {
    // Filtering a sorted slice keeps it sorted.
    let candidates: Vec<&StopTime> = catalog
        .stop_times()
        .iter()
        .filter(|st| active.contains(st.trip_id.as_str()) && !excluded.contains(&st.trip_id))
        .collect();

    let first = *candidates.first().ok_or(MonitorError::NoTripsAvailable)?;
    let idx = candidates.partition_point(|st| st.arrival_time < moment.time);

    Ok(match candidates.get(idx).copied() {
        Some(stop_time) => Departure {
            stop_time,
            next_day: false,
        },
        None => Departure {
            stop_time: first,
            next_day: true,
        },
    })
}
