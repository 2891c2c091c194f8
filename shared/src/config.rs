use crate::gateway::{HttpGateway, StaticResolver};
use crate::models::ServiceName;
use crate::notification::{KafkaNotifier, LogNotifier, Notifier};
use crate::resilience::{PolicyRegistry, ResilienceSettings};
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Where the other services live and how calls to them are guarded.
#[derive(Debug, Clone, Args)]
pub struct RemoteArgs {
    #[arg(long, env = "CONCERT_SERVICE_URL", default_value = "http://localhost:8082")]
    pub concert_service_url: String,

    #[arg(long, env = "TICKET_SERVICE_URL", default_value = "http://localhost:8083")]
    pub ticket_service_url: String,

    #[arg(long, env = "VENUE_SERVICE_URL", default_value = "http://localhost:8081")]
    pub venue_service_url: String,

    #[arg(long, default_value = "2000")]
    pub request_timeout_ms: u64,

    /// JSON file with per-service rate limiter, circuit breaker and retry settings.
    #[arg(long, env = "RESILIENCE_CONFIG")]
    pub resilience_config: Option<PathBuf>,
}

impl RemoteArgs {
    pub fn resolver(&self) -> StaticResolver {
        // Reservations are served by the concert service.
        StaticResolver::new()
            .with(ServiceName::Concert, &self.concert_service_url)
            .with(ServiceName::Reservation, &self.concert_service_url)
            .with(ServiceName::Ticket, &self.ticket_service_url)
            .with(ServiceName::Venue, &self.venue_service_url)
    }

    pub fn gateway(&self) -> HttpGateway {
        HttpGateway::new(
            Arc::new(self.resolver()),
            Duration::from_millis(self.request_timeout_ms),
        )
    }

    pub fn policies(&self) -> Result<Arc<PolicyRegistry>> {
        let settings = match &self.resilience_config {
            Some(path) => load_settings(path)?,
            None => ResilienceSettings::default(),
        };
        Ok(PolicyRegistry::shared(&settings))
    }
}

pub fn load_settings(path: &PathBuf) -> Result<ResilienceSettings> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading resilience config {}", path.display()))?;
    let settings = serde_json::from_str(&raw)
        .with_context(|| format!("parsing resilience config {}", path.display()))?;
    info!("Loaded resilience config from {}", path.display());
    Ok(settings)
}

#[derive(Debug, Clone, Args)]
pub struct NotificationArgs {
    #[arg(long, env = "KAFKA_BROKERS")]
    pub kafka_brokers: Option<String>,

    #[arg(long, default_value = "ticket-notifications")]
    pub notification_topic: String,
}

impl NotificationArgs {
    pub fn notifier(&self) -> Result<Arc<dyn Notifier>> {
        match &self.kafka_brokers {
            Some(brokers) => {
                info!("Publishing notifications to {} on {}", self.notification_topic, brokers);
                Ok(Arc::new(KafkaNotifier::connect(brokers, self.notification_topic.clone())?))
            }
            None => {
                info!("No Kafka brokers configured, notifications are only logged");
                Ok(Arc::new(LogNotifier))
            }
        }
    }
}
