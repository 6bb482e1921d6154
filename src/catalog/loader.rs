//! Builds a [`ScheduleCatalog`] from a static GTFS bundle.
//!
//! The bundle may be a remote zip (downloaded with [`fetch_bytes`]), a local
//! zip, or an already unpacked directory. Only the four tables needed for one
//! stop are read: `stops.txt`, `stop_times.txt`, `trips.txt`, `calendar.txt`.

use std::collections::HashSet;
use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use tracing::{debug, info, warn};
use zip::ZipArchive;

use super::{CalendarEntry, CatalogHandle, ScheduleCatalog, StopTime, Trip, Weekdays};
use crate::error::MonitorError;
use crate::fetch::{HttpClient, fetch_bytes};
use crate::time::ServiceTime;

const STOPS: &str = "stops.txt";
const STOP_TIMES: &str = "stop_times.txt";
const TRIPS: &str = "trips.txt";
const CALENDAR: &str = "calendar.txt";

/// Loads the catalog for `stop_code` from a URL, a zip file or a directory.
///
/// Calendar entries whose validity range does not contain `service_date` are
/// dropped.
#[tracing::instrument(skip(client))]
pub async fn load_catalog<C: HttpClient>(
    client: &C,
    source: &str,
    stop_code: &str,
    service_date: NaiveDate,
) -> Result<ScheduleCatalog> {
    if source.starts_with("http") {
        info!("Downloading GTFS bundle");
        let bytes = fetch_bytes(client, source).await?;
        debug!(bytes = bytes.len(), "GTFS bundle downloaded");
        let mut archive = ZipArchive::new(Cursor::new(bytes)).context("GTFS bundle is not a zip")?;
        return load_catalog_from_zip(&mut archive, stop_code, service_date);
    }

    let path = Path::new(source);
    if path.extension().and_then(|e| e.to_str()) == Some("zip") {
        let file = File::open(path).with_context(|| format!("opening {source}"))?;
        let mut archive = ZipArchive::new(file).with_context(|| format!("{source} is not a zip"))?;
        load_catalog_from_zip(&mut archive, stop_code, service_date)
    } else {
        load_catalog_from_dir(path, stop_code, service_date)
    }
}

/// Reloads the catalog published in `handle` when it was filtered for a date
/// other than `service_date`. Returns whether a reload happened.
///
/// On error the published catalog is left untouched.
#[tracing::instrument(skip(client, handle))]
pub async fn reload_for_date<C: HttpClient>(
    client: &C,
    handle: &CatalogHandle,
    source: &str,
    stop_code: &str,
    service_date: NaiveDate,
) -> Result<bool> {
    let loaded_for = handle.current().service_date();
    if loaded_for == Some(service_date) {
        return Ok(false);
    }

    info!(?loaded_for, %service_date, "Service date changed, reloading schedule");
    let catalog = load_catalog(client, source, stop_code, service_date).await?;
    handle.replace(catalog);
    Ok(true)
}

pub fn load_catalog_from_zip<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    stop_code: &str,
    service_date: NaiveDate,
) -> Result<ScheduleCatalog> {
    info!("Extracting stop_id data");
    let stop_id = find_stop_id(get_zip_file(archive, STOPS)?, stop_code)?;
    info!("Extracting stop_times data");
    let stop_times = load_stop_times(get_zip_file(archive, STOP_TIMES)?, &stop_id)?;
    info!("Extracting trips data");
    let trips = load_trips(get_zip_file(archive, TRIPS)?, &stop_times)?;
    info!("Extracting calendar data");
    let calendar = load_calendar(get_zip_file(archive, CALENDAR)?, service_date)?;

    finish(stop_id, stop_times, trips, calendar, service_date)
}

pub fn load_catalog_from_dir(
    dir: &Path,
    stop_code: &str,
    service_date: NaiveDate,
) -> Result<ScheduleCatalog> {
    let open = |name: &str| {
        let path = dir.join(name);
        File::open(&path).with_context(|| format!("opening {}", path.display()))
    };

    let stop_id = find_stop_id(open(STOPS)?, stop_code)?;
    let stop_times = load_stop_times(open(STOP_TIMES)?, &stop_id)?;
    let trips = load_trips(open(TRIPS)?, &stop_times)?;
    let calendar = load_calendar(open(CALENDAR)?, service_date)?;

    finish(stop_id, stop_times, trips, calendar, service_date)
}

fn finish(
    stop_id: String,
    stop_times: Vec<StopTime>,
    trips: Vec<Trip>,
    calendar: Vec<CalendarEntry>,
    service_date: NaiveDate,
) -> Result<ScheduleCatalog> {
    let catalog =
        ScheduleCatalog::new(stop_id, stop_times, trips, calendar)?.with_service_date(service_date);
    info!(
        stop_id = catalog.stop_id(),
        stop_times = catalog.stop_times().len(),
        trips = catalog.trips().count(),
        services = catalog.calendar().len(),
        "Schedule catalog loaded"
    );
    Ok(catalog)
}

// Adds the path in the error message
fn get_zip_file<'a, R: Read + Seek>(
    archive: &'a mut ZipArchive<R>,
    path: &str,
) -> Result<zip::read::ZipFile<'a>> {
    archive.by_name(path).map_err(|err| anyhow!("{path}: {err}"))
}

fn find_stop_id<R: Read>(reader: R, stop_code: &str) -> Result<String> {
    for rec in csv::Reader::from_reader(reader).deserialize() {
        let rec: StopRecord = rec.context(STOPS)?;
        if rec.stop_code.as_deref() == Some(stop_code) {
            debug!(stop_code, stop_id = %rec.stop_id, "Stop code resolved");
            return Ok(rec.stop_id);
        }
    }
    Err(MonitorError::UnknownStop(stop_code.to_string()).into())
}

fn load_stop_times<R: Read>(reader: R, stop_id: &str) -> Result<Vec<StopTime>> {
    let mut stop_times = Vec::new();
    let mut skipped = 0usize;
    for rec in csv::Reader::from_reader(reader).deserialize() {
        let rec: StopTimeRecord = rec.context(STOP_TIMES)?;
        if rec.stop_id != stop_id {
            continue;
        }
        // Non-timepoint stops may leave arrival_time empty
        let Some(raw) = [&rec.arrival_time, &rec.departure_time]
            .into_iter()
            .flatten()
            .map(|t| t.trim())
            .find(|t| !t.is_empty())
        else {
            warn!(trip_id = %rec.trip_id, "Stop time without arrival or departure, skipping");
            skipped += 1;
            continue;
        };
        let arrival_time: ServiceTime = match raw.parse() {
            Ok(time) => time,
            Err(e) => {
                warn!(trip_id = %rec.trip_id, error = %e, "Unusable stop time, skipping");
                skipped += 1;
                continue;
            }
        };
        stop_times.push(StopTime {
            trip_id: rec.trip_id,
            arrival_time,
            stop_sequence: rec.stop_sequence,
        });
    }
    if skipped > 0 {
        warn!(skipped, stop_id, "Skipped stop_times.txt records at this stop");
    }
    if stop_times.is_empty() {
        return Err(MonitorError::EmptyStopTimes {
            stop_id: stop_id.to_string(),
        }
        .into());
    }
    Ok(stop_times)
}

fn load_trips<R: Read>(reader: R, stop_times: &[StopTime]) -> Result<Vec<Trip>> {
    let calling: HashSet<&str> = stop_times.iter().map(|st| st.trip_id.as_str()).collect();
    let mut trips = Vec::new();
    for rec in csv::Reader::from_reader(reader).deserialize() {
        let rec: TripRecord = rec.context(TRIPS)?;
        if !calling.contains(rec.trip_id.as_str()) {
            continue;
        }
        trips.push(Trip {
            trip_id: rec.trip_id,
            service_id: rec.service_id,
            route_id: rec.route_id,
            headsign: rec.trip_headsign.filter(|h| !h.is_empty()),
            wheelchair_accessible: rec.wheelchair_accessible == Some(1),
        });
    }

    if trips.len() < calling.len() {
        warn!(
            missing = calling.len() - trips.len(),
            "Stop times reference trips missing from trips.txt"
        );
    }
    Ok(trips)
}

fn load_calendar<R: Read>(reader: R, service_date: NaiveDate) -> Result<Vec<CalendarEntry>> {
    let mut calendar = Vec::new();
    for rec in csv::Reader::from_reader(reader).deserialize() {
        let rec: CalendarRecord = rec.context(CALENDAR)?;
        let start_date = parse_date(&rec.start_date)?;
        let end_date = parse_date(&rec.end_date)?;
        if service_date < start_date || service_date > end_date {
            debug!(service_id = %rec.service_id, %start_date, %end_date, "Service not valid on this date");
            continue;
        }
        calendar.push(CalendarEntry {
            service_id: rec.service_id,
            days: Weekdays {
                monday: rec.monday,
                tuesday: rec.tuesday,
                wednesday: rec.wednesday,
                thursday: rec.thursday,
                friday: rec.friday,
                saturday: rec.saturday,
                sunday: rec.sunday,
            },
        });
    }
    Ok(calendar)
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y%m%d")
        .with_context(|| format!("{CALENDAR}: invalid date {value:?}"))
}

#[derive(Deserialize)]
struct StopRecord {
    stop_id: String,
    stop_code: Option<String>,
}

#[derive(Deserialize)]
struct StopTimeRecord {
    trip_id: String,
    arrival_time: Option<String>,
    departure_time: Option<String>,
    stop_id: String,
    stop_sequence: u32,
}

#[derive(Deserialize)]
struct TripRecord {
    trip_id: String,
    route_id: String,
    service_id: String,
    trip_headsign: Option<String>,
    wheelchair_accessible: Option<u8>,
}

#[derive(Deserialize)]
struct CalendarRecord {
    service_id: String,
    #[serde(deserialize_with = "parse_bool")]
    monday: bool,
    #[serde(deserialize_with = "parse_bool")]
    tuesday: bool,
    #[serde(deserialize_with = "parse_bool")]
    wednesday: bool,
    #[serde(deserialize_with = "parse_bool")]
    thursday: bool,
    #[serde(deserialize_with = "parse_bool")]
    friday: bool,
    #[serde(deserialize_with = "parse_bool")]
    saturday: bool,
    #[serde(deserialize_with = "parse_bool")]
    sunday: bool,
    start_date: String,
    end_date: String,
}

fn parse_bool<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    match u8::deserialize(d)? {
        0 => Ok(false),
        1 => Ok(true),
        n => Err(serde::de::Error::custom(format!("unknown bool value {n}"))),
    }
}
