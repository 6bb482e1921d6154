//! Assembles the virtual monitor rows.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::CatalogHandle;
use crate::clock::Clock;
use crate::delay::delay_for;
use crate::error::MonitorError;
use crate::realtime::{FeedTransport, RealtimeFeedClient};
use crate::resolver::{ExclusionSet, next_departure};
use crate::service_day::active_trips;
use crate::time::ServiceTime;

/// One line of the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimetableRow {
    pub trip_id: String,
    pub arrival_time: ServiceTime,
    pub headsign: Option<String>,
    pub route_id: String,
    pub wheelchair_accessible: bool,
    /// Seconds, negative when early. `None` without real-time data.
    pub arrival_delay: Option<i32>,
    /// The departure belongs to the next service day.
    pub next_day: bool,
}

pub struct TimetableBuilder<T, K> {
    catalog: Arc<CatalogHandle>,
    feed: RealtimeFeedClient<T>,
    clock: K,
}

impl<T: FeedTransport, K: Clock> TimetableBuilder<T, K> {
    pub fn new(catalog: Arc<CatalogHandle>, feed: RealtimeFeedClient<T>, clock: K) -> Self {
        Self {
            catalog,
            feed,
            clock,
        }
    }

    /// Returns up to `n` upcoming departures in selection order, each trip at
    /// most once. Fewer rows come back when the day has fewer active trips.
    ///
    /// The clock is read once and one catalog version is used throughout, so
    /// a build is consistent even if the schedule is refreshed meanwhile.
    ///
    /// # Errors
    ///
    /// - [`MonitorError::InvalidConfig`] if `n` is zero.
    /// - [`MonitorError::NoActiveService`] if no service runs today.
    /// - [`MonitorError::Cancelled`] if `cancel` fires between rows.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn build(
        &self,
        n: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<TimetableRow>, MonitorError> {
        if n == 0 {
            return Err(MonitorError::InvalidConfig(
                "row count must be positive".to_string(),
            ));
        }

        let moment = self.clock.now();
        let catalog = self.catalog.current();
        let active = active_trips(&catalog, &moment)?;

        let outcome = self.feed.fetch(&moment).await;
        let snapshot = outcome.snapshot();

        let mut excluded = ExclusionSet::new();
        let mut rows = Vec::with_capacity(n);
        while rows.len() < n {
            if cancel.is_cancelled() {
                info!(rows = rows.len(), "Timetable build cancelled");
                return Err(MonitorError::Cancelled);
            }

            let departure = match next_departure(&catalog, &active, &excluded, &moment) {
                Ok(departure) => departure,
                Err(MonitorError::NoTripsAvailable) => {
                    debug!(rows = rows.len(), "No more trips available");
                    break;
                }
                Err(e) => return Err(e),
            };

            let trip_id = departure.stop_time.trip_id.as_str();
            excluded.insert(trip_id);

            let Some(trip) = catalog.trip(trip_id) else {
                warn!(trip_id, "Departure refers to an unknown trip, skipping");
                continue;
            };

            rows.push(TimetableRow {
                trip_id: trip.trip_id.clone(),
                arrival_time: departure.stop_time.arrival_time,
                headsign: trip.headsign.clone(),
                route_id: trip.route_id.clone(),
                wheelchair_accessible: trip.wheelchair_accessible,
                arrival_delay: delay_for(snapshot, trip_id),
                next_day: departure.next_day,
            });
        }

        info!(
            rows = rows.len(),
            realtime = snapshot.is_some(),
            "Timetable built"
        );
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::abc_catalog;
    use crate::catalog::{CalendarEntry, ScheduleCatalog, StopTime, Trip, Weekdays};
    use crate::clock::FixedClock;
    use crate::realtime::test_support::{Reply, ScriptedTransport, corrupt, feed_bytes};
    use chrono::{TimeZone, Utc, Weekday};

    fn clock(hour: u32, minute: u32) -> FixedClock {
        // 2024-03-15 is a Friday
        FixedClock::at(&Utc.with_ymd_and_hms(2024, 3, 15, hour, minute, 0).unwrap())
    }

    fn builder(
        catalog: ScheduleCatalog,
        reply: Reply,
        clock: FixedClock,
    ) -> TimetableBuilder<ScriptedTransport, FixedClock> {
        TimetableBuilder::new(
            Arc::new(CatalogHandle::new(catalog)),
            RealtimeFeedClient::new(ScriptedTransport::always(reply), 3),
            clock,
        )
    }

    fn trip_ids(rows: &[TimetableRow]) -> Vec<&str> {
        rows.iter().map(|r| r.trip_id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_next_two_departures() {
        let b = builder(abc_catalog(), Reply::Bytes(feed_bytes(None, &[])), clock(8, 10));
        let rows = b.build(2, &CancellationToken::new()).await.unwrap();

        assert_eq!(trip_ids(&rows), ["B", "C"]);
        assert_eq!(rows[0].arrival_time.to_string(), "08:15:00");
        assert_eq!(rows[1].arrival_time.to_string(), "08:30:00");
        assert!(rows.iter().all(|r| !r.next_day));
    }

    #[tokio::test]
    async fn test_wraparound_after_last_departure() {
        let b = builder(abc_catalog(), Reply::Bytes(feed_bytes(None, &[])), clock(23, 55));
        let rows = b.build(1, &CancellationToken::new()).await.unwrap();

        assert_eq!(trip_ids(&rows), ["A"]);
        assert_eq!(rows[0].arrival_time.to_string(), "08:00:00");
        assert!(rows[0].next_day);
    }

    #[tokio::test]
    async fn test_remaining_today_then_tomorrow() {
        let b = builder(abc_catalog(), Reply::Bytes(feed_bytes(None, &[])), clock(8, 20));
        let rows = b.build(3, &CancellationToken::new()).await.unwrap();

        assert_eq!(trip_ids(&rows), ["C", "A", "B"]);
        let next_day: Vec<_> = rows.iter().map(|r| r.next_day).collect();
        assert_eq!(next_day, [false, true, true]);
    }

    #[tokio::test]
    async fn test_short_result_when_trips_run_out() {
        let b = builder(abc_catalog(), Reply::Bytes(feed_bytes(None, &[])), clock(8, 10));
        let rows = b.build(10, &CancellationToken::new()).await.unwrap();
        assert_eq!(trip_ids(&rows), ["B", "C", "A"]);
    }

    #[tokio::test]
    async fn test_delays_are_overlaid_by_trip_id() {
        let feed = feed_bytes(None, &[("B", 120), ("Z", 30)]);
        let b = builder(abc_catalog(), Reply::Bytes(feed), clock(8, 10));
        let rows = b.build(2, &CancellationToken::new()).await.unwrap();

        assert_eq!(rows[0].arrival_delay, Some(120));
        assert_eq!(rows[1].arrival_delay, None);
    }

    #[tokio::test]
    async fn test_corrupt_feed_still_builds_full_timetable() {
        let b = builder(abc_catalog(), corrupt(), clock(8, 10));
        let rows = b.build(3, &CancellationToken::new()).await.unwrap();

        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.arrival_delay.is_none()));
        assert_eq!(b.feed.transport().calls(), 3);
    }

    #[tokio::test]
    async fn test_row_carries_trip_details() {
        let b = builder(abc_catalog(), Reply::Offline, clock(8, 10));
        let rows = b.build(1, &CancellationToken::new()).await.unwrap();

        assert_eq!(
            rows[0],
            TimetableRow {
                trip_id: "B".to_string(),
                arrival_time: ServiceTime::from_hms(8, 15, 0),
                headsign: Some("to B".to_string()),
                route_id: "route-B".to_string(),
                wheelchair_accessible: true,
                arrival_delay: None,
                next_day: false,
            }
        );
    }

    #[tokio::test]
    async fn test_no_active_service_aborts_before_fetching() {
        let catalog = ScheduleCatalog::new(
            "stop-1",
            vec![StopTime {
                trip_id: "S".to_string(),
                arrival_time: ServiceTime::from_hms(9, 0, 0),
                stop_sequence: 1,
            }],
            vec![Trip {
                trip_id: "S".to_string(),
                service_id: "sunday".to_string(),
                route_id: "1".to_string(),
                headsign: None,
                wheelchair_accessible: false,
            }],
            vec![CalendarEntry {
                service_id: "sunday".to_string(),
                days: Weekdays {
                    sunday: true,
                    ..Default::default()
                },
            }],
        )
        .unwrap();
        let b = builder(catalog, Reply::Offline, clock(8, 10));

        assert_eq!(
            b.build(1, &CancellationToken::new()).await.unwrap_err(),
            MonitorError::NoActiveService {
                weekday: Weekday::Fri
            }
        );
        assert_eq!(b.feed.transport().calls(), 0);
    }

    #[tokio::test]
    async fn test_zero_rows_is_rejected() {
        let b = builder(abc_catalog(), Reply::Offline, clock(8, 10));
        assert!(matches!(
            b.build(0, &CancellationToken::new()).await,
            Err(MonitorError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_build() {
        let b = builder(abc_catalog(), Reply::Offline, clock(8, 10));
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(
            b.build(2, &cancel).await.unwrap_err(),
            MonitorError::Cancelled
        );
    }

    #[tokio::test]
    async fn test_build_reads_one_catalog_version() {
        let handle = Arc::new(CatalogHandle::new(abc_catalog()));
        let b = TimetableBuilder::new(
            Arc::clone(&handle),
            RealtimeFeedClient::new(ScriptedTransport::always(Reply::Offline), 1),
            clock(8, 10),
        );
        let before = b.build(3, &CancellationToken::new()).await.unwrap();

        let replacement = ScheduleCatalog::new(
            "stop-1",
            vec![StopTime {
                trip_id: "X".to_string(),
                arrival_time: ServiceTime::from_hms(8, 12, 0),
                stop_sequence: 1,
            }],
            vec![Trip {
                trip_id: "X".to_string(),
                service_id: "daily".to_string(),
                route_id: "9".to_string(),
                headsign: None,
                wheelchair_accessible: false,
            }],
            vec![CalendarEntry {
                service_id: "daily".to_string(),
                days: Weekdays::all(),
            }],
        )
        .unwrap();
        handle.replace(replacement);
        let after = b.build(3, &CancellationToken::new()).await.unwrap();

        assert_eq!(trip_ids(&before), ["B", "C", "A"]);
        assert_eq!(trip_ids(&after), ["X"]);
    }
}
