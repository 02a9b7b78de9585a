//! Pipeline event notifications
//!
//! Publishes chapter lifecycle events to an event bus so downstream stages
//! can react without polling. Delivery is at-least-once and best-effort:
//! stage code treats a publish failure as a warning, never as a stage
//! failure.
//!
//! # Example
//! ```rust,no_run
//! use doc_pipeline_events::{ChapterEvent, EventBusConfig, EventBridgePublisher, EventPublisher};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let publisher = EventBridgePublisher::new(EventBusConfig::default()).await?;
//! publisher
//!     .publish_chapter_processed(&ChapterEvent::new("provisioning"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

use aws_sdk_eventbridge::config::{Credentials, Region};
use aws_sdk_eventbridge::types::PutEventsRequestEntry;
use aws_sdk_eventbridge::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

/// Event source attached to every published entry
pub const EVENT_SOURCE: &str = "doc-pipeline";

/// Detail type for chapter completion events
pub const CHAPTER_PROCESSED: &str = "ChapterProcessed";

/// Errors that can occur while publishing events
#[derive(Error, Debug)]
pub enum EventError {
    #[error("Publish error: {0}")]
    PublishError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type EventResult<T> = Result<T, EventError>;

/// Event bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusConfig {
    /// AWS region (e.g., "us-west-2")
    pub region: String,

    /// Custom endpoint for local event bus emulators, empty for AWS
    pub endpoint: Option<String>,

    /// AWS access key ID
    pub access_key_id: String,

    /// AWS secret access key
    pub secret_access_key: String,

    /// Event bus name
    pub bus_name: String,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            region: "us-west-2".to_string(),
            endpoint: None,
            access_key_id: std::env::var("AWS_ACCESS_KEY_ID").unwrap_or_default(),
            secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default(),
            bus_name: "default".to_string(),
        }
    }
}

/// Payload for a chapter completion event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterEvent {
    /// Folder name of the processed chapter
    pub chapter_folder: String,
}

impl ChapterEvent {
    #[must_use]
    pub fn new(chapter_folder: impl Into<String>) -> Self {
        Self {
            chapter_folder: chapter_folder.into(),
        }
    }
}

/// Event publisher trait
#[async_trait::async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a chapter completion event
    async fn publish_chapter_processed(&self, event: &ChapterEvent) -> EventResult<()>;
}

/// EventBridge publisher implementation
pub struct EventBridgePublisher {
    client: Client,
    bus_name: String,
}

impl EventBridgePublisher {
    /// Create a new EventBridge publisher
    pub async fn new(config: EventBusConfig) -> EventResult<Self> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "doc-pipeline-events",
        );

        let region = Region::new(config.region.clone());

        let mut bus_config_builder = aws_sdk_eventbridge::Config::builder()
            .credentials_provider(credentials)
            .region(region)
            .behavior_version_latest();

        // Set custom endpoint for local emulators
        if let Some(endpoint) = config.endpoint {
            bus_config_builder = bus_config_builder.endpoint_url(endpoint);
        }

        let bus_config = bus_config_builder.build();
        let client = Client::from_conf(bus_config);

        Ok(Self {
            client,
            bus_name: config.bus_name,
        })
    }
}

#[async_trait::async_trait]
impl EventPublisher for EventBridgePublisher {
    async fn publish_chapter_processed(&self, event: &ChapterEvent) -> EventResult<()> {
        let detail =
            serde_json::to_string(event).map_err(|e| EventError::SerializationError(e.to_string()))?;

        let entry = PutEventsRequestEntry::builder()
            .source(EVENT_SOURCE)
            .detail_type(CHAPTER_PROCESSED)
            .detail(detail)
            .event_bus_name(&self.bus_name)
            .build();

        let response = self
            .client
            .put_events()
            .entries(entry)
            .send()
            .await
            .map_err(|e| EventError::PublishError(e.to_string()))?;

        // put_events succeeds as a call even when individual entries fail
        if response.failed_entry_count() > 0 {
            return Err(EventError::PublishError(format!(
                "{} event entries failed",
                response.failed_entry_count()
            )));
        }

        tracing::info!("Event sent for {}", event.chapter_folder);
        Ok(())
    }
}

/// In-memory publisher for tests
#[derive(Default)]
pub struct MemoryPublisher {
    events: Mutex<Vec<ChapterEvent>>,
    fail_next: Mutex<bool>,
}

impl MemoryPublisher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next publish call fail
    pub async fn fail_next(&self) {
        *self.fail_next.lock().await = true;
    }

    /// Events published so far
    pub async fn published(&self) -> Vec<ChapterEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl EventPublisher for MemoryPublisher {
    async fn publish_chapter_processed(&self, event: &ChapterEvent) -> EventResult<()> {
        let mut fail_next = self.fail_next.lock().await;
        if *fail_next {
            *fail_next = false;
            return Err(EventError::PublishError("injected publish failure".to_string()));
        }
        drop(fail_next);

        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_bus_config_default() {
        let config = EventBusConfig::default();
        assert_eq!(config.region, "us-west-2");
        assert_eq!(config.bus_name, "default");
        assert!(config.endpoint.is_none());
    }

    #[test]
    fn test_chapter_event_detail_shape() {
        let event = ChapterEvent::new("provisioning");
        let detail = serde_json::to_string(&event).unwrap();
        assert_eq!(detail, r#"{"chapter_folder":"provisioning"}"#);
    }

    #[tokio::test]
    async fn test_memory_publisher_records_events() {
        let publisher = MemoryPublisher::new();
        publisher
            .publish_chapter_processed(&ChapterEvent::new("chapter-1"))
            .await
            .unwrap();
        publisher
            .publish_chapter_processed(&ChapterEvent::new("chapter-2"))
            .await
            .unwrap();

        let published = publisher.published().await;
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].chapter_folder, "chapter-1");
        assert_eq!(published[1].chapter_folder, "chapter-2");
    }

    #[tokio::test]
    async fn test_memory_publisher_injected_failure_is_one_shot() {
        let publisher = MemoryPublisher::new();
        publisher.fail_next().await;

        let failed = publisher
            .publish_chapter_processed(&ChapterEvent::new("chapter-1"))
            .await;
        assert!(failed.is_err());

        publisher
            .publish_chapter_processed(&ChapterEvent::new("chapter-1"))
            .await
            .unwrap();
        assert_eq!(publisher.published().await.len(), 1);
    }
}
