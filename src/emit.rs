//! Defines the processing event published after a blob has been
//! handled.

use anyhow::{Context, Result};
use aws_sdk_sqs::Client;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

/// The JSON event published to the event queue once a blob has been
/// processed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProcessedEvent {
    /// When the blob was processed.
    pub processed_at: DateTime<Utc>,

    /// The key of the blob that was processed.
    pub source_blob_name: String,

    // TODO: replace the placeholder fields with the real event payload
    pub field1: String,
    pub field2: String,
}

impl ProcessedEvent {
    /// Build the event describing the processing of the named blob.
    pub fn new(source_blob_name: &str) -> Self {
        ProcessedEvent {
            processed_at: Utc::now(),
            source_blob_name: String::from(source_blob_name),
            field1: String::from("Foo"),
            field2: String::from("Bar"),
        }
    }
}

/// Publishes a processing event to the event queue.
pub async fn send(client: &Client, queue_url: &str, event: &ProcessedEvent) -> Result<()> {
    let body =
        serde_json::to_string(event).context("Failed to serialize the processing event")?;
    info!("Publishing processing event: {}", body);
    client
        .send_message()
        .queue_url(queue_url)
        .message_body(body)
        .send()
        .await
        .with_context(|| {
            format!(
                "Failed to publish the processing event for blob {:?}",
                event.source_blob_name
            )
        })?;
    Ok(())
}
