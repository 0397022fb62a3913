//! SQS implementation of the event queue port.
//!
//! Receives use long polling (20 s) with a 30 s visibility timeout. A
//! message is deleted (acknowledged) only after its body decodes into a
//! `ParsedEvent`; undecodable messages are left for redelivery or the
//! dead-letter queue configured out-of-band.

use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_sqs::types::MessageAttributeValue;
use tracing::{debug, info, instrument, warn};

use gnodex_core::error::{QueueError, QueueResult};
use gnodex_core::models::ParsedEvent;
use gnodex_core::ports::EventQueue;

/// SQS long-polling wait.
pub const LONG_POLL_SECONDS: i32 = 20;

/// How long an unacknowledged message stays invisible before redelivery.
pub const VISIBILITY_TIMEOUT_SECONDS: i32 = 30;

/// Configuration for the SQS queue adapter.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Queue name (resolved to a URL at connect time).
    pub queue_name: String,
    /// Endpoint override (e.g. a LocalStack edge URL); None for AWS.
    pub endpoint_url: Option<String>,
    /// AWS region.
    pub region: String,
    /// Maximum messages per receive call (1..=10).
    pub max_messages: i32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_name: "token-events".to_string(),
            endpoint_url: None,
            region: "ap-northeast-2".to_string(),
            max_messages: 10,
        }
    }
}

/// SQS-backed event queue.
pub struct SqsEventQueue {
    client: aws_sdk_sqs::Client,
    queue_url: String,
    config: QueueConfig,
}

impl SqsEventQueue {
    /// Resolve the queue URL and build the client.
    ///
    /// Credentials come from the standard AWS environment/profile chain.
    #[instrument(skip_all, fields(queue = %config.queue_name))]
    pub async fn connect(config: QueueConfig) -> QueueResult<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;
        let client = aws_sdk_sqs::Client::new(&sdk_config);

        let queue_url = client
            .get_queue_url()
            .queue_name(&config.queue_name)
            .send()
            .await
            .map_err(|e| QueueError::ConnectionError(e.to_string()))?
            .queue_url
            .ok_or_else(|| {
                QueueError::ConnectionError(format!("no URL for queue {}", config.queue_name))
            })?;

        info!(url = %queue_url, "📮 Queue connected");

        Ok(Self {
            client,
            queue_url,
            config,
        })
    }

    fn string_attribute(value: &str) -> QueueResult<MessageAttributeValue> {
        MessageAttributeValue::builder()
            .data_type("String")
            .string_value(value)
            .build()
            .map_err(|e| QueueError::Enqueue(e.to_string()))
    }
}

#[async_trait]
impl EventQueue for SqsEventQueue {
    async fn send(&self, event: &ParsedEvent) -> QueueResult<()> {
        let body =
            serde_json::to_string(event).map_err(|e| QueueError::Enqueue(e.to_string()))?;

        let result = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .message_attributes("EventType", Self::string_attribute(event.event_type.as_str())?)
            .message_attributes("TokenPath", Self::string_attribute(&event.token_path)?)
            .send()
            .await
            .map_err(|e| QueueError::Enqueue(e.to_string()))?;

        debug!(
            event_type = %event.event_type,
            message_id = result.message_id.as_deref().unwrap_or(""),
            "Event enqueued"
        );
        Ok(())
    }

    async fn receive(&self) -> QueueResult<Vec<ParsedEvent>> {
        let result = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(self.config.max_messages.clamp(1, 10))
            .visibility_timeout(VISIBILITY_TIMEOUT_SECONDS)
            .wait_time_seconds(LONG_POLL_SECONDS)
            .message_attribute_names("All")
            .send()
            .await
            .map_err(|e| QueueError::Dequeue(e.to_string()))?;

        let messages = result.messages.unwrap_or_default();
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        debug!(count = messages.len(), "Messages received");

        let mut events = Vec::with_capacity(messages.len());
        for message in messages {
            let message_id = message.message_id.as_deref().unwrap_or("").to_string();

            let event: ParsedEvent = match message
                .body
                .as_deref()
                .ok_or_else(|| QueueError::Decode("empty body".into()))
                .and_then(|body| {
                    serde_json::from_str(body).map_err(|e| QueueError::Decode(e.to_string()))
                }) {
                Ok(event) => event,
                Err(e) => {
                    // Not acknowledged: the broker re-delivers after the
                    // visibility window, or moves it to the DLQ.
                    warn!(message_id = %message_id, error = %e, "Undecodable message, skipping");
                    continue;
                }
            };

            let Some(receipt) = message.receipt_handle.as_deref() else {
                warn!(message_id = %message_id, "Message without receipt handle");
                continue;
            };

            if let Err(e) = self
                .client
                .delete_message()
                .queue_url(&self.queue_url)
                .receipt_handle(receipt)
                .send()
                .await
            {
                warn!(message_id = %message_id, error = %e, "Failed to acknowledge message");
                continue;
            }

            events.push(event);
        }

        Ok(events)
    }

    async fn close(&self) {
        // The SQS client holds no persistent connection.
        debug!("Queue connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use gnodex_core::models::EventType;

    fn sample_event() -> ParsedEvent {
        ParsedEvent {
            event_type: EventType::Mint,
            token_path: "gno.land/r/demo/foo".into(),
            from_address: String::new(),
            to_address: "g1abc".into(),
            amount: BigDecimal::from(100u32),
            tx_hash: "txhash".into(),
            block_height: 10,
            event_index: 0,
        }
    }

    #[test]
    fn message_body_round_trips() {
        let event = sample_event();
        let body = serde_json::to_string(&event).unwrap();
        let back: ParsedEvent = serde_json::from_str(&body).unwrap();

        assert_eq!(back.event_type, EventType::Mint);
        assert_eq!(back.amount, event.amount);
        assert_eq!(back.tx_hash, "txhash");
    }

    #[test]
    fn string_attributes_build() {
        let attr = SqsEventQueue::string_attribute("MINT").unwrap();
        assert_eq!(attr.data_type(), "String");
        assert_eq!(attr.string_value(), Some("MINT"));
    }

    #[test]
    fn garbage_bodies_fail_decode() {
        assert!(serde_json::from_str::<ParsedEvent>("{\"not\":\"an event\"}").is_err());
    }
}
