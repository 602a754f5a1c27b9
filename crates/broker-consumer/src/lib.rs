//! The broker-response consumer.
//!
//! Reads shipping-result messages from the single configured topic,
//! `auto_offset_reset=earliest`, manual offset commit after the inbox
//! transaction succeeds. If offset commit fails after a successful DB
//! commit, the next restart redelivers the message — the inbox unique key
//! absorbs the duplicate.

use std::sync::Arc;

use model::ShippingResultMessage;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use service::ShippingResultHandler;
use thiserror::Error;
use tokio::sync::Notify;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("kafka error: {0}")]
    Kafka(#[from] KafkaError),
}

/// `order-service-group` consumer group over the shared shipping topic.
pub struct ShippingResultConsumer {
    consumer: StreamConsumer,
    handler: Arc<ShippingResultHandler>,
}

impl ShippingResultConsumer {
    pub fn new(
        brokers: &[String],
        topic: &str,
        handler: Arc<ShippingResultHandler>,
    ) -> Result<Self, ConsumerError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers.join(","))
            .set("group.id", "order-service-group")
            .set("enable.partition.eof", "false")
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", "false")
            .create()?;
        consumer.subscribe(&[topic])?;
        Ok(Self { consumer, handler })
    }

    /// Runs until `shutdown` is notified.
    pub async fn run(&self, shutdown: Arc<Notify>) -> Result<(), ConsumerError> {
        let mut stream = self.consumer.stream();

        loop {
            tokio::select! {
                maybe_msg = stream.next() => {
                    match maybe_msg {
                        Some(Ok(msg)) => {
                            let Some(payload) = msg.payload() else {
                                warn!("shipping message had no payload, skipping");
                                self.consumer.commit_message(&msg, CommitMode::Sync).ok();
                                continue;
                            };

                            match serde_json::from_slice::<ShippingResultMessage>(payload) {
                                Ok(message) => match self.handler.handle(message).await {
                                    Ok(()) => {
                                        if let Err(e) = self.consumer.commit_message(&msg, CommitMode::Sync) {
                                            error!(error = %e, "failed to commit offset after successful processing");
                                        }
                                    }
                                    Err(e) => {
                                        error!(error = %e, "failed to process shipping result, offset not committed");
                                    }
                                },
                                Err(e) => {
                                    error!(error = %e, "failed to deserialize shipping result message, skipping");
                                    self.consumer.commit_message(&msg, CommitMode::Sync).ok();
                                }
                            }
                        }
                        Some(Err(e)) => error!(error = %e, "kafka stream error"),
                        None => {
                            debug!("kafka stream ended");
                            break;
                        }
                    }
                }
                _ = shutdown.notified() => {
                    info!("shipping result consumer received shutdown signal");
                    break;
                }
            }
        }
        Ok(())
    }
}
