pub mod catalog;
pub mod clock;
pub mod config;
pub mod delay;
pub mod error;
pub mod fetch;
pub mod output;
pub mod parser;
pub mod realtime;
pub mod resolver;
pub mod service_day;
pub mod time;
pub mod timetable;

pub mod gtfs_rt {
    include!(concat!(env!("OUT_DIR"), "/transit_realtime.rs"));
}

pub use catalog::{CatalogHandle, ScheduleCatalog};
pub use error::MonitorError;
pub use timetable::{TimetableBuilder, TimetableRow};
