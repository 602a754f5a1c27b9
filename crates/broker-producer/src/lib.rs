//! Broker producer — idempotent publication of `shipping.requested` outbox
//! rows to the single configured topic.
//!
//! JSON-encoded values, UTF-8 string keys, explicit `start`/`stop`
//! lifecycle. `enable.idempotence=true` requires `acks=all` in librdkafka,
//! recorded as a deliberate correction in DESIGN.md.

use app_config::AppConfig;
use model::payload::ShippingRequestPayload;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("broker producer is not started")]
    NotStarted,
    #[error("failed to publish message: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Idempotent single-topic producer.
pub struct ShippingProducer {
    producer: Option<FutureProducer>,
    topic: String,
}

impl ShippingProducer {
    pub fn new(cfg: &AppConfig) -> Self {
        Self {
            producer: None,
            topic: cfg.kafka_topic.clone(),
        }
    }

    /// Builds and starts the underlying `rdkafka` producer.
    pub fn start(&mut self, cfg: &AppConfig) -> Result<(), ProducerError> {
        if self.producer.is_some() {
            return Ok(());
        }
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", cfg.kafka_bootstrap.join(","))
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .set("message.timeout.ms", "5000")
            .create()?;
        self.producer = Some(producer);
        info!(topic = %self.topic, "shipping producer started");
        Ok(())
    }

    pub fn stop(&mut self) {
        self.producer = None;
    }

    /// Publishes a `shipping.requested` message keyed by `order_id`,
    /// awaiting the broker ack before returning.
    pub async fn publish_shipping_request(
        &self,
        payload: &ShippingRequestPayload,
    ) -> Result<(), ProducerError> {
        let producer = self.producer.as_ref().ok_or(ProducerError::NotStarted)?;
        let value = serde_json::to_string(payload)?;
        let key = payload.order_id.to_string();

        let record = FutureRecord::to(&self.topic).key(&key).payload(&value);
        producer
            .send(record, Timeout::After(std::time::Duration::from_secs(5)))
            .await
            .map_err(|(err, _owned_msg)| {
                error!(error = %err, "failed to publish shipping request");
                err
            })?;
        Ok(())
    }
}
