use crate::models::Ticket;
use anyhow::Result;
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    Purchase,
    Cancellation,
    Reschedule,
}

/// Message handed to the mail service. QR rendering happens on the consumer side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketNotification {
    pub kind: NotificationKind,
    pub ticket: Ticket,
    pub qr_payload: Option<String>,
}

impl TicketNotification {
    pub fn new(kind: NotificationKind, ticket: Ticket, qr_payload: Option<String>) -> Self {
        Self { kind, ticket, qr_payload }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &TicketNotification) -> Result<()>;
}

/// Publishes notifications to a Kafka topic, keyed by ticket id.
pub struct KafkaNotifier {
    producer: FutureProducer,
    topic: String,
}

impl KafkaNotifier {
    pub fn new(producer: FutureProducer, topic: String) -> Self {
        Self { producer, topic }
    }

    pub fn connect(brokers: &str, topic: String) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;
        Ok(Self::new(producer, topic))
    }
}

#[async_trait]
impl Notifier for KafkaNotifier {
    async fn notify(&self, notification: &TicketNotification) -> Result<()> {
        let json = serde_json::to_string(notification)?;
        let key = notification.ticket.id.to_string();
        let record = FutureRecord::to(&self.topic)
            .payload(&json)
            .key(&key);

        self.producer.send(record, Duration::from_secs(5)).await
            .map_err(|(e, _)| anyhow::anyhow!("Failed to publish notification: {}", e))?;

        Ok(())
    }
}

/// Used when no broker is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &TicketNotification) -> Result<()> {
        info!(
            "{:?} notification for ticket {} to {}",
            notification.kind, notification.ticket.id, notification.ticket.holder_email
        );
        Ok(())
    }
}

/// Sends the batch in the background. Failures are logged and never reach the caller.
pub fn dispatch(notifier: Arc<dyn Notifier>, notifications: Vec<TicketNotification>) -> JoinHandle<()> {
    tokio::spawn(async move {
        for notification in notifications {
            if let Err(e) = notifier.notify(&notification).await {
                error!(
                    "Failed to send {:?} notification for ticket {}: {}",
                    notification.kind, notification.ticket.id, e
                );
            }
        }
    })
}
