//! Best-effort GTFS-RT TripUpdates client.
//!
//! Real-time data only decorates the static timetable, so nothing in here
//! ever fails the caller: transport and decode problems are retried a
//! bounded number of times and then reported as [`FeedOutcome::Unavailable`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::clock::Moment;
use crate::fetch::{HttpClient, fetch_bytes};
use crate::gtfs_rt::{FeedMessage, TripUpdate};
use crate::parser::parse_feed;

pub const DEFAULT_RETRY_LIMIT: u32 = 3;

/// Source of raw feed bytes.
#[async_trait]
pub trait FeedTransport: Send + Sync {
    async fn fetch(&self) -> Result<Vec<u8>>;
}

#[async_trait]
impl<T: FeedTransport + ?Sized> FeedTransport for Arc<T> {
    async fn fetch(&self) -> Result<Vec<u8>> {
        (**self).fetch().await
    }
}

/// Fetches the feed over HTTP.
pub struct HttpFeed<C> {
    client: C,
    url: String,
}

impl<C: HttpClient> HttpFeed<C> {
    pub fn new(client: C, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl<C: HttpClient> FeedTransport for HttpFeed<C> {
    async fn fetch(&self) -> Result<Vec<u8>> {
        fetch_bytes(&self.client, &self.url).await
    }
}

/// One decoded feed message, reduced to what the delay overlay needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RealtimeSnapshot {
    /// POSIX time at which the producer created the feed.
    pub timestamp: Option<u64>,
    /// Trip updates in feed order.
    pub trip_updates: Vec<TripUpdate>,
}

impl From<FeedMessage> for RealtimeSnapshot {
    fn from(feed: FeedMessage) -> Self {
        Self {
            timestamp: feed.header.timestamp,
            trip_updates: feed
                .entity
                .into_iter()
                .filter(|e| !e.is_deleted())
                .filter_map(|e| e.trip_update)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    /// The feed could not be fetched (connectivity, HTTP status).
    Transport(String),
    /// The bytes arrived but are not a valid feed message.
    Decode(String),
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Transport(msg) => write!(f, "transport error: {msg}"),
            FailureCause::Decode(msg) => write!(f, "decode error: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedOutcome {
    Success(RealtimeSnapshot),
    /// A single attempt failed; another may succeed.
    TransientFailure { attempt: u32, cause: FailureCause },
    /// No usable snapshot for this build.
    Unavailable { attempts: u32 },
}

impl FeedOutcome {
    pub fn snapshot(&self) -> Option<&RealtimeSnapshot> {
        match self {
            FeedOutcome::Success(snapshot) => Some(snapshot),
            _ => None,
        }
    }
}

pub struct RealtimeFeedClient<T> {
    transport: T,
    retry_limit: u32,
    max_age: Option<Duration>,
}

impl<T: FeedTransport> RealtimeFeedClient<T> {
    /// `retry_limit` is the total number of attempts per fetch; zero is
    /// treated as one.
    pub fn new(transport: T, retry_limit: u32) -> Self {
        Self {
            transport,
            retry_limit: retry_limit.max(1),
            max_age: None,
        }
    }

    /// Snapshots whose header timestamp is older than `max_age` are treated
    /// as unavailable.
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetches and decodes once.
    pub async fn attempt(&self, attempt: u32) -> FeedOutcome {
        match self.try_once(attempt).await {
            Ok(snapshot) => FeedOutcome::Success(snapshot),
            Err(cause) => FeedOutcome::TransientFailure { attempt, cause },
        }
    }

    async fn try_once(&self, attempt: u32) -> Result<RealtimeSnapshot, FailureCause> {
        let bytes = self
            .transport
            .fetch()
            .await
            .map_err(|e| FailureCause::Transport(format!("{e:#}")))?;
        debug!(attempt, bytes = bytes.len(), "Feed bytes received, decoding");

        parse_feed(&bytes)
            .map(RealtimeSnapshot::from)
            .map_err(|e| FailureCause::Decode(format!("{e:#}")))
    }

    /// Retries [`attempt`](Self::attempt) immediately until it succeeds or
    /// the retry limit is reached.
    ///
    /// Never returns [`FeedOutcome::TransientFailure`].
    #[tracing::instrument(skip(self, moment), fields(retry_limit = self.retry_limit))]
    pub async fn fetch(&self, moment: &Moment) -> FeedOutcome {
        for attempt in 1..=self.retry_limit {
            match self.try_once(attempt).await {
                Ok(snapshot) => {
                    if self.is_stale(&snapshot, moment) {
                        warn!(
                            feed_timestamp = snapshot.timestamp,
                            now = moment.unix_seconds,
                            "Real-time feed is stale, ignoring it"
                        );
                        return FeedOutcome::Unavailable { attempts: attempt };
                    }
                    info!(
                        attempt,
                        trip_updates = snapshot.trip_updates.len(),
                        "Real-time feed decoded"
                    );
                    return FeedOutcome::Success(snapshot);
                }
                Err(FailureCause::Transport(msg)) => {
                    warn!(attempt, error = %msg, "Real-time feed fetch failed");
                }
                Err(FailureCause::Decode(msg)) => {
                    warn!(attempt, error = %msg, "Real-time feed is corrupt");
                }
            }
        }

        warn!(
            attempts = self.retry_limit,
            "Real-time data unavailable, showing static timetable only"
        );
        FeedOutcome::Unavailable {
            attempts: self.retry_limit,
        }
    }

    /// A timestamp beyond `i64` range is treated as fresh.
    fn is_stale(&self, snapshot: &RealtimeSnapshot, moment: &Moment) -> bool {
        let (Some(max_age), Some(timestamp)) = (self.max_age, snapshot.timestamp) else {
            return false;
        };
        let Ok(timestamp) = i64::try_from(timestamp) else {
            return false;
        };
        let max_age = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
        moment.unix_seconds.saturating_sub(timestamp) > max_age
    }
}
