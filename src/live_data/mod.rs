// Live data topic contract and publisher

pub mod publisher;

pub use publisher::{run_live_data_publisher, LiveDataPublisher, Publish, PublisherConfig};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Topic the backend broadcasts live values on
pub const LIVE_DATA_TOPIC: &str = "/topic/live-data";

/// Payload of a `/topic/live-data` message
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LiveData {
    pub value: f64,

    /// Producer time; absent on some producers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
}

/// Fractional values below this are epoch seconds (year 5138), above are epoch millis
const FRACTIONAL_SECONDS_LIMIT: f64 = 1e11;

/// Timestamp encodings seen on the topic
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    /// Unix epoch milliseconds
    EpochMillis(i64),
    /// Fractional epoch value, seconds or milliseconds by magnitude
    Fractional(f64),
    /// RFC 3339 date string
    Text(String),
}

impl Timestamp {
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Timestamp::EpochMillis(millis) => DateTime::from_timestamp_millis(*millis),
            Timestamp::Fractional(value) => {
                if !value.is_finite() {
                    return None;
                }
                let millis = if value.abs() < FRACTIONAL_SECONDS_LIMIT {
                    value * 1000.0
                } else {
                    *value
                };
                DateTime::from_timestamp_millis(millis.round() as i64)
            }
            Timestamp::Text(text) => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

impl LiveData {
    pub fn new(value: f64, observed_at: DateTime<Utc>) -> Self {
        Self {
            value,
            timestamp: Some(Timestamp::EpochMillis(observed_at.timestamp_millis())),
        }
    }

    /// Parse a message body
    pub fn parse(body: &str) -> Result<Self> {
        serde_json::from_str(body).context("Failed to parse live data payload")
    }

    /// When the value was produced, if the timestamp is usable
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp.as_ref().and_then(Timestamp::to_datetime)
    }
}
