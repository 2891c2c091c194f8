use crate::error::{ErrorResponse, ServiceError, ServiceResult};
use crate::models::*;
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait ConcertGateway: Send + Sync {
    async fn concert(&self, id: ConcertId) -> ServiceResult<Concert>;
}

#[async_trait]
pub trait VenueGateway: Send + Sync {
    async fn venue(&self, id: VenueId) -> ServiceResult<Venue>;
}

#[async_trait]
pub trait ReservationGateway: Send + Sync {
    async fn reservation(&self, id: ReservationId) -> ServiceResult<Reservation>;

    /// Not idempotent: a re-sent request may consume a second unit.
    async fn consume_one(&self, id: ReservationId) -> ServiceResult<bool>;
}

#[async_trait]
pub trait TicketGateway: Send + Sync {
    async fn tickets_for_reservation(&self, reservation_id: ReservationId) -> ServiceResult<Vec<Ticket>>;

    async fn delete_tickets_for_reservation(&self, reservation_id: ReservationId) -> ServiceResult<Vec<Ticket>>;
}

/// Resolves a logical service name to a reachable base URL.
pub trait ServiceResolver: Send + Sync {
    fn resolve(&self, service: ServiceName) -> ServiceResult<String>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    endpoints: HashMap<ServiceName, String>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, service: ServiceName, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.endpoints
            .insert(service, base_url.trim_end_matches('/').to_string());
        self
    }
}

impl ServiceResolver for StaticResolver {
    fn resolve(&self, service: ServiceName) -> ServiceResult<String> {
        self.endpoints
            .get(&service)
            .cloned()
            .ok_or_else(|| ServiceError::Transient(format!("no endpoint registered for {} service", service)))
    }
}

#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    resolver: Arc<dyn ServiceResolver>,
    timeout: Duration,
}

impl HttpGateway {
    pub fn new(resolver: Arc<dyn ServiceResolver>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            resolver,
            timeout,
        }
    }

    async fn call<T: DeserializeOwned>(&self, service: ServiceName, method: Method, path: &str) -> ServiceResult<T> {
        let url = format!("{}{}", self.resolver.resolve(service)?, path);
        debug!("Calling {} service: {} {}", service, method, url);

        let response = self
            .client
            .request(method, &url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| classify_transport_error(service, e))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| ServiceError::Unexpected(format!("{} service returned malformed body: {}", service, e)));
        }

        let body = response.json::<ErrorResponse>().await.ok();
        Err(classify_status(service, status, body))
    }
}

fn classify_transport_error(service: ServiceName, err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::Transient(format!("{} service timed out", service))
    } else {
        ServiceError::Transient(format!("{} service unreachable: {}", service, err))
    }
}

/// Maps a non-2xx status back onto the taxonomy the remote side used.
pub fn classify_status(service: ServiceName, status: StatusCode, body: Option<ErrorResponse>) -> ServiceError {
    let message = body
        .as_ref()
        .map(|b| b.error.clone())
        .unwrap_or_else(|| format!("{} service responded {}", service, status));
    let kind = body.as_ref().map(|b| b.kind.as_str());

    match status {
        StatusCode::NOT_FOUND => ServiceError::NotFound(message),
        StatusCode::CONFLICT => match kind {
            Some("insufficient_inventory") => ServiceError::InvalidRequest(message),
            _ => ServiceError::SoldOut,
        },
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => ServiceError::Transient(message),
        s if s.is_server_error() => ServiceError::Transient(message),
        _ => ServiceError::InvalidRequest(message),
    }
}

#[async_trait]
impl ConcertGateway for HttpGateway {
    async fn concert(&self, id: ConcertId) -> ServiceResult<Concert> {
        self.call(ServiceName::Concert, Method::GET, &format!("/concert/{}", id))
            .await
    }
}

#[async_trait]
impl VenueGateway for HttpGateway {
    async fn venue(&self, id: VenueId) -> ServiceResult<Venue> {
        self.call(ServiceName::Venue, Method::GET, &format!("/venue/{}", id))
            .await
    }
}

#[async_trait]
impl ReservationGateway for HttpGateway {
    async fn reservation(&self, id: ReservationId) -> ServiceResult<Reservation> {
        self.call(ServiceName::Reservation, Method::GET, &format!("/reservation/{}", id))
            .await
    }

    async fn consume_one(&self, id: ReservationId) -> ServiceResult<bool> {
        let result: ConsumeResult = self
            .call(ServiceName::Reservation, Method::POST, &format!("/reservation/{}/consume", id))
            .await?;
        Ok(result.consumed)
    }
}

#[async_trait]
impl TicketGateway for HttpGateway {
    async fn tickets_for_reservation(&self, reservation_id: ReservationId) -> ServiceResult<Vec<Ticket>> {
        self.call(
            ServiceName::Ticket,
            Method::GET,
            &format!("/ticket/reservation/{}", reservation_id),
        )
        .await
    }

    async fn delete_tickets_for_reservation(&self, reservation_id: ReservationId) -> ServiceResult<Vec<Ticket>> {
        self.call(
            ServiceName::Ticket,
            Method::DELETE,
            &format!("/ticket/reservation/{}", reservation_id),
        )
        .await
    }
}
