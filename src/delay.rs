//! Real-time delay lookup for a scheduled trip.

use crate::realtime::RealtimeSnapshot;

/// Arrival delay in seconds reported for `trip_id`, if any.
///
/// The delay comes from the first stop-time update of the first matching
/// trip update, whichever stop that update refers to. For a trip that has
/// not yet reached the monitored stop this is usually the delay at the
/// vehicle's next stop.
pub fn delay_for(snapshot: Option<&RealtimeSnapshot>, trip_id: &str) -> Option<i32> {
    snapshot?
        .trip_updates
        .iter()
        .find(|update| update.trip.trip_id.as_deref() == Some(trip_id))?
        .stop_time_update
        .first()?
        .arrival
        .as_ref()?
        .delay
}
