use super::{LiveData, LIVE_DATA_TOPIC};
use anyhow::{Context, Result};
use chrono::Utc;
use rand::Rng;
use serde::Deserialize;
use std::ops::Range;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

/// Something live data can be published to
pub trait Publish: Send + Sync {
    /// Returns the number of subscribers reached
    fn publish(&self, destination: &str, body: &str) -> usize;
}

impl Publish for crate::memory::MemoryBroker {
    fn publish(&self, destination: &str, body: &str) -> usize {
        crate::memory::MemoryBroker::publish(self, destination, body)
    }
}

/// Live data publisher configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct PublisherConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_min_value")]
    pub min_value: f64,
    #[serde(default = "default_max_value")]
    pub max_value: f64,
}

fn default_enabled() -> bool {
    true
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_min_value() -> f64 {
    90.0
}

fn default_max_value() -> f64 {
    100.0
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_ms: default_interval_ms(),
            min_value: default_min_value(),
            max_value: default_max_value(),
        }
    }
}

/// Broadcasts random values on the live data topic
pub struct LiveDataPublisher<P> {
    target: P,
    range: Range<f64>,
    destination: String,
}

impl<P: Publish> LiveDataPublisher<P> {
    pub fn new(target: P, config: &PublisherConfig) -> Self {
        Self {
            target,
            range: config.min_value..config.max_value,
            destination: LIVE_DATA_TOPIC.to_string(),
        }
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = destination.into();
        self
    }

    /// Next random sample, stamped with the current time
    pub fn sample(&self) -> LiveData {
        let value = if self.range.is_empty() {
            self.range.start
        } else {
            rand::thread_rng().gen_range(self.range.clone())
        };
        LiveData::new(value, Utc::now())
    }

    /// Publish one sample
    pub fn publish_once(&self) -> Result<LiveData> {
        let data = self.sample();
        let body = serde_json::to_string(&data).context("Failed to serialize live data")?;

        let delivered = self.target.publish(&self.destination, &body);
        debug!(
            destination = %self.destination,
            value = data.value,
            delivered = delivered,
            "Published live data"
        );

        Ok(data)
    }
}

/// Publish a sample every `interval_ms` until the task is dropped
pub async fn run_live_data_publisher<P: Publish>(
    publisher: LiveDataPublisher<P>,
    interval_ms: u64,
) {
    let mut ticker = interval(Duration::from_millis(interval_ms.max(1)));

    // Skip missed ticks to prevent a burst after a stall
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        if let Err(e) = publisher.publish_once() {
            warn!(error = %e, "Failed to publish live data");
        }
    }
}
