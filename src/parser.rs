//! Protobuf decoder for GTFS Realtime TripUpdates feeds.

use anyhow::Result;
use prost::Message;

use crate::gtfs_rt::FeedMessage;

/// Decodes a protobuf-encoded GTFS-RT [`FeedMessage`] from raw bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not valid protobuf for a `FeedMessage`.
pub fn parse_feed(bytes: &[u8]) -> Result<FeedMessage> {
    Ok(FeedMessage::decode(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gtfs_rt::trip_update::{StopTimeEvent, StopTimeUpdate};
    use crate::gtfs_rt::{FeedEntity, FeedHeader, TripDescriptor, TripUpdate};

    #[test]
    fn test_parse_empty_bytes_returns_default_feed() {
        // Protobuf decodes an empty buffer to all-default fields
        let feed = parse_feed(&[]).unwrap();
        assert_eq!(feed.header.gtfs_realtime_version, "");
        assert!(feed.entity.is_empty());
    }

    #[test]
    fn test_parse_invalid_bytes() {
        let invalid_bytes = vec![0xFF, 0xFE, 0x00, 0x01];
        assert!(parse_feed(&invalid_bytes).is_err());
    }

    #[test]
    fn test_parse_truncated_feed() {
        let mut encoded = trip_update_feed().encode_to_vec();
        encoded.truncate(encoded.len() - 3);
        assert!(parse_feed(&encoded).is_err());
    }

    #[test]
    fn test_parse_trip_update_feed() {
        let parsed = parse_feed(&trip_update_feed().encode_to_vec()).unwrap();

        assert_eq!(parsed.header.gtfs_realtime_version, "2.0");
        assert_eq!(parsed.header.timestamp, Some(1710486000));
        let update = parsed.entity[0].trip_update.as_ref().unwrap();
        assert_eq!(update.trip.trip_id.as_deref(), Some("1_123^N"));
        assert_eq!(
            update.stop_time_update[0].arrival.as_ref().unwrap().delay,
            Some(-30)
        );
    }

    fn trip_update_feed() -> FeedMessage {
        FeedMessage {
            header: FeedHeader {
                gtfs_realtime_version: "2.0".to_string(),
                timestamp: Some(1710486000),
                incrementality: None,
                feed_version: None,
            },
            entity: vec![FeedEntity {
                id: "e1".to_string(),
                trip_update: Some(TripUpdate {
                    trip: TripDescriptor {
                        trip_id: Some("1_123^N".to_string()),
                        ..Default::default()
                    },
                    stop_time_update: vec![StopTimeUpdate {
                        stop_sequence: Some(7),
                        arrival: Some(StopTimeEvent {
                            delay: Some(-30),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
                ..Default::default()
            }],
        }
    }
}
