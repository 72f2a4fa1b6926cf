//! Webhook event bodies sent by the collection service.

use serde::Deserialize;

use docenrich_shared::{BatchRef, EnrichError, Result};

/// Sent once when the enrichment is registered.
pub const PING: &str = "ping";

/// Sent whenever a batch of documents is ready to be enriched.
pub const BATCH_CREATED: &str = "enrichment.batch.created";

/// A decoded webhook notification.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub version: Option<String>,
    pub instance_id: Option<String>,
    pub created_at: Option<String>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Ping,
    BatchCreated(BatchRef),
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    event: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    instance_id: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct BatchData {
    project_id: String,
    collection_id: String,
    batch_id: String,
}

impl WebhookEvent {
    /// Decode a request body. Unknown event names are rejected.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let raw: RawEvent = serde_json::from_slice(body)
            .map_err(|e| EnrichError::parse(format!("invalid webhook body: {e}")))?;

        let payload = match raw.event.as_str() {
            PING => EventPayload::Ping,
            BATCH_CREATED => {
                let data: BatchData = serde_json::from_value(raw.data).map_err(|e| {
                    EnrichError::parse(format!("invalid {BATCH_CREATED} data: {e}"))
                })?;
                let version = raw.version.clone().ok_or_else(|| {
                    EnrichError::validation(format!("{BATCH_CREATED} event without version"))
                })?;
                EventPayload::BatchCreated(BatchRef {
                    project_id: data.project_id,
                    collection_id: data.collection_id,
                    batch_id: data.batch_id,
                    version,
                })
            }
            other => {
                return Err(EnrichError::validation(format!(
                    "unknown webhook event: {other}"
                )));
            }
        };

        Ok(Self {
            version: raw.version,
            instance_id: raw.instance_id,
            created_at: raw.created_at,
            payload,
        })
    }

    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self.payload {
            EventPayload::Ping => PING,
            EventPayload::BatchCreated(_) => BATCH_CREATED,
        }
    }
}
