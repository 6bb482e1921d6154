//! Which trips run on a given day.

use std::collections::HashSet;

use tracing::debug;

use crate::catalog::ScheduleCatalog;
use crate::clock::Moment;
use crate::error::MonitorError;

/// Returns the ids of the catalog's trips whose service runs on the weekday
/// of `moment`.
///
/// # Errors
///
/// [`MonitorError::NoActiveService`] when no calendar entry runs on that
/// weekday. An active service without trips at this stop yields an empty set.
pub fn active_trips<'a>(
    catalog: &'a ScheduleCatalog,
    moment: &Moment,
) -> Result<HashSet<&'a str>, MonitorError> {
    let services: HashSet<&str> = catalog
        .calendar()
        .iter()
        .filter(|entry| entry.days.includes(moment.weekday))
        .map(|entry| entry.service_id.as_str())
        .collect();

    if services.is_empty() {
        return Err(MonitorError::NoActiveService {
            weekday: moment.weekday,
        });
    }

    let trips: HashSet<&str> = catalog
        .trips()
        .filter(|trip| services.contains(trip.service_id.as_str()))
        .map(|trip| trip.trip_id.as_str())
        .collect();

    debug!(
        weekday = %moment.weekday,
        services = services.len(),
        trips = trips.len(),
        "Active trips resolved"
    );
    Ok(trips)
}
