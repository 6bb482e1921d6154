//! Rendering and persistence of monitor rows.
//!
//! Supports a human-readable board, JSON, and CSV append.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::timetable::TimetableRow;
use csv::WriterBuilder;
use std::fs::OpenOptions;
use std::path::Path;

/// Formats one row as a departure-board line, e.g.
/// `16   Franowo              08:15:00  +2 min ♿`.
pub fn format_row(row: &TimetableRow) -> String {
    let delay = match row.arrival_delay {
        Some(seconds) => format_delay(seconds),
        None => String::new(),
    };
    let mut line = format!(
        "{:<4} {:<20} {}{} {:>8}",
        row.route_id,
        row.headsign.as_deref().unwrap_or("-"),
        row.arrival_time,
        if row.next_day { "*" } else { " " },
        delay,
    );
    if row.wheelchair_accessible {
        line.push_str(" ♿");
    }
    line.trim_end().to_string()
}

fn format_delay(seconds: i32) -> String {
    // Rounded toward zero so that "on time" covers the first minute.
    let minutes = seconds / 60;
    match minutes {
        0 => "on time".to_string(),
        m if m > 0 => format!("+{m} min"),
        m => format!("{m} min"),
    }
}

/// Logs the board, one line per row.
pub fn print_board(stop_code: &str, rows: &[TimetableRow]) {
    info!(stop_code, rows = rows.len(), "Virtual monitor");
    for row in rows {
        info!("{}", format_row(row));
    }
    debug!("{:#?}", rows);
}

/// Logs the rows as pretty-printed JSON.
pub fn print_json(rows: &[TimetableRow]) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(rows)?);
    Ok(())
}

#[derive(Serialize)]
struct RowRecord<'a> {
    generated_at: DateTime<Utc>,
    stop_code: &'a str,
    trip_id: &'a str,
    route_id: &'a str,
    headsign: Option<&'a str>,
    arrival_time: String,
    next_day: bool,
    wheelchair_accessible: bool,
    arrival_delay: Option<i32>,
}

/// Appends one CSV row per [`TimetableRow`], all stamped with `generated_at`.
///
/// Creates the file with headers if it does not already exist.
pub fn append_record(
    path: &str,
    stop_code: &str,
    generated_at: DateTime<Utc>,
    rows: &[TimetableRow],
) -> Result<()> {
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, rows = rows.len(), "Appending CSV records");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    for row in rows {
        writer.serialize(RowRecord {
            generated_at,
            stop_code,
            trip_id: &row.trip_id,
            route_id: &row.route_id,
            headsign: row.headsign.as_deref(),
            arrival_time: row.arrival_time.to_string(),
            next_day: row.next_day,
            wheelchair_accessible: row.wheelchair_accessible,
            arrival_delay: row.arrival_delay,
        })?;
    }
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ServiceTime;
    use std::fs;

    fn row(trip_id: &str, delay: Option<i32>) -> TimetableRow {
        TimetableRow {
            trip_id: trip_id.to_string(),
            arrival_time: ServiceTime::from_hms(8, 15, 0),
            headsign: Some("Franowo".to_string()),
            route_id: "16".to_string(),
            wheelchair_accessible: true,
            arrival_delay: delay,
            next_day: false,
        }
    }

    #[test]
    fn test_format_row_with_delay() {
        let line = format_row(&row("T1", Some(150)));
        assert!(line.starts_with("16   Franowo"));
        assert!(line.contains("08:15:00"));
        assert!(line.contains("+2 min"));
        assert!(line.ends_with('♿'));
    }

    #[test]
    fn test_format_row_without_realtime() {
        let mut r = row("T1", None);
        r.wheelchair_accessible = false;
        r.next_day = true;
        let line = format_row(&r);
        assert!(line.ends_with("08:15:00*"));
    }

    #[test]
    fn test_format_delay() {
        assert_eq!(format_delay(30), "on time");
        assert_eq!(format_delay(-59), "on time");
        assert_eq!(format_delay(-120), "-2 min");
        assert_eq!(format_delay(600), "+10 min");
    }

    #[test]
    fn test_print_json_does_not_panic() {
        print_json(&[row("T1", Some(60))]).unwrap();
    }

    #[test]
    fn test_append_record_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.csv");
        let path = path.to_str().unwrap();

        let rows = [row("T1", Some(60)), row("T2", None)];
        append_record(path, "MOGI42", Utc::now(), &rows).unwrap();
        append_record(path, "MOGI42", Utc::now(), &rows[..1]).unwrap();

        let content = fs::read_to_string(path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        // 1 header + 3 data rows
        assert_eq!(lines.len(), 4);
        assert_eq!(
            content.lines().filter(|l| l.contains("generated_at")).count(),
            1
        );
        assert!(lines[1].contains("T1") && lines[1].contains("08:15:00"));
    }
}
