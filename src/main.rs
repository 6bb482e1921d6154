//! CLI entry point for the virtual monitor.
//!
//! Shows the next departures at one stop from the static GTFS schedule,
//! annotated with GTFS-RT delays, either once or on a polling loop.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Local, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use virtual_monitor::{
    CatalogHandle, MonitorError, TimetableBuilder,
    catalog::loader::{load_catalog, reload_for_date},
    clock::{Clock, FixedClock, SystemClock},
    config::{
        DEFAULT_ROWS, DEFAULT_SCHEDULE_URL, DEFAULT_STOP_CODE, DEFAULT_TRIP_UPDATES_URL,
        MonitorConfig,
    },
    delay::delay_for,
    fetch::{BasicClient, HttpClient},
    output::{append_record, print_board, print_json},
    parser::parse_feed,
    realtime::{DEFAULT_RETRY_LIMIT, FeedTransport, HttpFeed, RealtimeFeedClient, RealtimeSnapshot},
};

const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "virtual_monitor")]
#[command(about = "Next departures at a transit stop from GTFS and GTFS-RT", long_about = None)]
struct Cli {
    /// Logging level (-v for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Also write JSON logs to a daily rolling file (LOG_FILE_PATH)
    #[arg(short, long, global = true, default_value_t = false)]
    log: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct MonitorArgs {
    /// Stop code as printed on the stop
    #[arg(long, env = "STOP_CODE", default_value = DEFAULT_STOP_CODE)]
    stop_code: String,

    /// GTFS schedule: URL of the zip bundle, local zip, or unpacked directory
    #[arg(long, env = "GTFS_SCHEDULE", default_value = DEFAULT_SCHEDULE_URL)]
    schedule: String,

    /// GTFS-RT TripUpdates feed URL
    #[arg(long, env = "GTFS_RT_TRIP_UPDATES_URL", default_value = DEFAULT_TRIP_UPDATES_URL)]
    feed_url: String,

    /// Attempts per real-time fetch before showing the timetable without delays
    #[arg(long, env = "RT_RETRY_LIMIT", default_value_t = DEFAULT_RETRY_LIMIT)]
    retry_limit: u32,

    /// Number of departures to show
    #[arg(short = 'n', long, default_value_t = DEFAULT_ROWS)]
    rows: usize,

    /// Ignore real-time feeds older than this many seconds
    #[arg(long, value_name = "SECS")]
    max_feed_age: Option<u64>,
}

impl From<MonitorArgs> for MonitorConfig {
    fn from(args: MonitorArgs) -> Self {
        MonitorConfig {
            stop_code: args.stop_code,
            schedule_source: args.schedule,
            feed_url: args.feed_url,
            retry_limit: args.retry_limit,
            rows: args.rows,
            max_feed_age: args.max_feed_age.map(Duration::from_secs),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show the next departures once
    Show {
        #[command(flatten)]
        monitor: MonitorArgs,

        /// Print rows as JSON instead of a board
        #[arg(long, default_value_t = false)]
        json: bool,

        /// CSV file to append rows to
        #[arg(short, long)]
        output: Option<String>,

        /// Resolve as of this RFC 3339 time instead of now
        #[arg(long, value_name = "DATETIME")]
        at: Option<DateTime<FixedOffset>>,
    },
    /// Refresh the monitor periodically until Ctrl+C
    Watch {
        #[command(flatten)]
        monitor: MonitorArgs,

        /// Seconds between monitor refreshes
        #[arg(short, long, default_value_t = 30)]
        interval: u64,

        /// Hours between schedule reloads
        #[arg(long, default_value_t = 24)]
        refresh_hours: u64,

        /// CSV file to append rows to
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Decode a GTFS-RT TripUpdates feed from a file or URL and summarize it
    Feed {
        /// Path to file or URL to fetch
        #[arg(value_name = "FILE_OR_URL")]
        source: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    let cli = Cli::parse();
    let _file_guard = init_logging(cli.verbose, cli.log)?;

    match cli.command {
        Commands::Show {
            monitor,
            json,
            output,
            at,
        } => {
            let config = MonitorConfig::from(monitor);
            config.validate()?;
            match at {
                Some(at) => {
                    let clock = FixedClock::at(&at);
                    show(&config, clock, json, output.as_deref()).await?;
                }
                None => show(&config, SystemClock, json, output.as_deref()).await?,
            }
        }
        Commands::Watch {
            monitor,
            interval,
            refresh_hours,
            output,
        } => {
            let config = MonitorConfig::from(monitor);
            config.validate()?;
            watch(
                &config,
                Duration::from_secs(interval.max(1)),
                Duration::from_secs(refresh_hours.max(1) * 3600),
                output,
            )
            .await?;
        }
        Commands::Feed { source } => {
            let bytes = fetcher(&source).await?;
            let feed = parse_feed(&bytes).context("feed is not a valid GTFS-RT message")?;
            summarize_feed(&RealtimeSnapshot::from(feed));
        }
    }

    Ok(())
}

/// Logging setup: colored stderr, plus a JSON rolling log file with `--log`.
fn init_logging(verbose: u8, log_to_file: bool) -> Result<Option<WorkerGuard>> {
    let level = if verbose == 0 { "info" } else { "debug" };

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive(level.parse()?));

    let (json_layer, guard) = if log_to_file {
        let log_file_path = std::env::var("LOG_FILE_PATH")
            .unwrap_or_else(|_| "logs/virtual_monitor.log".to_string());
        let log_dir = Path::new(&log_file_path)
            .parent()
            .unwrap_or(Path::new("logs"));
        let log_file_name = Path::new(&log_file_path)
            .file_name()
            .unwrap_or(OsStr::new("virtual_monitor.log"));

        let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
        let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

        let layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(non_blocking_file)
            .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    Ok(guard)
}

fn http_client() -> Result<Arc<BasicClient>> {
    Ok(Arc::new(BasicClient::with_timeout(HTTP_TIMEOUT)?))
}

fn realtime_client<C: HttpClient>(
    client: C,
    config: &MonitorConfig,
) -> RealtimeFeedClient<HttpFeed<C>> {
    RealtimeFeedClient::new(HttpFeed::new(client, &config.feed_url), config.retry_limit)
        .with_max_age(config.max_feed_age)
}

/// Builds the monitor once and prints it.
async fn show<K: Clock>(
    config: &MonitorConfig,
    clock: K,
    json: bool,
    output: Option<&str>,
) -> Result<()> {
    let client = http_client()?;
    let service_date = clock.now().date;
    let catalog = load_catalog(&client, &config.schedule_source, &config.stop_code, service_date).await?;

    let builder = TimetableBuilder::new(
        Arc::new(CatalogHandle::new(catalog)),
        realtime_client(Arc::clone(&client), config),
        clock,
    );
    let rows = builder.build(config.rows, &CancellationToken::new()).await?;
    if rows.len() < config.rows {
        warn!(requested = config.rows, shown = rows.len(), "Fewer trips than requested");
    }

    if json {
        print_json(&rows)?;
    } else {
        print_board(&config.stop_code, &rows);
    }
    if let Some(path) = output {
        append_record(path, &config.stop_code, Utc::now(), &rows)?;
    }
    Ok(())
}

/// Rebuilds the monitor every `interval` and reloads the schedule every
/// `refresh` and whenever the local date changes, until Ctrl+C.
#[tracing::instrument(skip(config, output), fields(stop_code = %config.stop_code))]
async fn watch(
    config: &MonitorConfig,
    interval: Duration,
    refresh: Duration,
    output: Option<String>,
) -> Result<()> {
    let client = http_client()?;
    let catalog = load_catalog(
        &client,
        &config.schedule_source,
        &config.stop_code,
        Local::now().date_naive(),
    )
    .await?;
    let handle = Arc::new(CatalogHandle::new(catalog));

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl+C received, stopping");
            }
            cancel.cancel();
        }
    });

    let refresher = tokio::spawn(refresh_schedule(
        Arc::clone(&client),
        Arc::clone(&handle),
        config.schedule_source.clone(),
        config.stop_code.clone(),
        refresh,
        cancel.clone(),
    ));

    let builder = TimetableBuilder::new(
        Arc::clone(&handle),
        realtime_client(Arc::clone(&client), config),
        SystemClock,
    );

    info!(interval_secs = interval.as_secs(), "Watching. Press Ctrl+C to stop.");
    let mut ticker = tokio::time::interval(interval);
    let result = loop {
        tokio::select! {
            _ = cancel.cancelled() => break Ok(()),
            _ = ticker.tick() => {}
        }

        let today = SystemClock.now().date;
        if let Err(e) = reload_for_date(
            &client,
            &handle,
            &config.schedule_source,
            &config.stop_code,
            today,
        )
        .await
        {
            error!(error = ?e, %today, "Schedule reload for new service date failed");
        }

        match builder.build(config.rows, &cancel).await {
            Ok(rows) => {
                print_board(&config.stop_code, &rows);
                if let Some(path) = &output {
                    if let Err(e) = append_record(path, &config.stop_code, Utc::now(), &rows) {
                        error!(error = %e, path = %path, "Failed to append monitor rows");
                    }
                }
            }
            Err(MonitorError::Cancelled) => break Ok(()),
            Err(MonitorError::NoActiveService { weekday }) => {
                warn!(%weekday, "No service runs today, monitor is empty");
            }
            Err(e) => {
                cancel.cancel();
                break Err(e);
            }
        }
    };

    cancel.cancel();
    let _ = refresher.await;
    result?;
    info!("Stopped");
    Ok(())
}

/// Reloads the schedule every `every` and publishes it to `handle`. A failed
/// reload keeps the current catalog.
async fn refresh_schedule(
    client: Arc<BasicClient>,
    handle: Arc<CatalogHandle>,
    source: String,
    stop_code: String,
    every: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(every) => {}
        }

        info!("Refreshing schedule");
        let service_date: NaiveDate = Local::now().date_naive();
        match load_catalog(&client, &source, &stop_code, service_date).await {
            Ok(catalog) => {
                handle.replace(catalog);
                info!("Schedule refreshed");
            }
            Err(e) => error!(error = ?e, "Schedule refresh failed, keeping previous catalog"),
        }
    }
}

/// Loads feed data from a local file path or fetches it over HTTP.
#[tracing::instrument(fields(source = %url))]
async fn fetcher(url: &str) -> Result<Vec<u8>> {
    let bytes = if url.starts_with("http") {
        let feed = HttpFeed::new(BasicClient::new(), url);
        feed.fetch().await?
    } else {
        std::fs::read(url).with_context(|| format!("reading {url}"))?
    };
    debug!(bytes = bytes.len(), "Feed bytes loaded");
    Ok(bytes)
}

fn summarize_feed(snapshot: &RealtimeSnapshot) {
    let with_delay = snapshot
        .trip_updates
        .iter()
        .filter_map(|u| u.trip.trip_id.as_deref())
        .filter(|trip_id| delay_for(Some(snapshot), trip_id).is_some())
        .count();

    info!(
        timestamp = snapshot.timestamp,
        trip_updates = snapshot.trip_updates.len(),
        with_delay,
        "Feed summary"
    );
    for update in &snapshot.trip_updates {
        let Some(trip_id) = update.trip.trip_id.as_deref() else {
            continue;
        };
        debug!(
            trip_id,
            route_id = update.trip.route_id.as_deref(),
            stop_time_updates = update.stop_time_update.len(),
            delay = delay_for(Some(snapshot), trip_id),
            "Trip update"
        );
    }
}
