#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{NaiveDate, Utc};
use concert_service::ledger::InventoryLedger;
use concert_service::store::{ConcertStore, MemoryStore, NewReservation};
use shared::gateway::{ConcertGateway, ReservationGateway, VenueGateway};
use shared::notification::{Notifier, TicketNotification};
use shared::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, PolicyRegistry, RateLimiterConfig, ResilienceConfig,
    ResilienceSettings, RetryConfig,
};
use shared::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;
use ticket_service::admission::AdmissionWorkflow;
use ticket_service::aggregation::Aggregator;
use ticket_service::handlers::TicketHandler;
use ticket_service::store::MemoryTicketStore;
use tokio::sync::{mpsc, Barrier, Mutex};

/// In-process stand-in for the concert, reservation and venue services, backed
/// by the real in-memory ledger. Every capability can be taken down.
pub struct FakeCluster {
    pub store: Arc<MemoryStore>,
    venues: Mutex<HashMap<VenueId, Venue>>,
    pub concert_down: AtomicBool,
    pub reservation_down: AtomicBool,
    pub venue_down: AtomicBool,
    /// Consume calls allowed before the ledger starts timing out. Negative is unlimited.
    pub consume_budget: AtomicI32,
    /// Remaining count reported by reservation lookups instead of the real one.
    pub reported_remaining: Mutex<Option<i32>>,
    pub reservation_gate: Option<Arc<Barrier>>,
    /// When set, the first consume trips the reservation breaker of this registry open.
    pub trip_after_consume: Mutex<Option<Arc<PolicyRegistry>>>,
    pub concert_calls: AtomicU32,
    pub consume_calls: AtomicU32,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            venues: Mutex::new(HashMap::new()),
            concert_down: AtomicBool::new(false),
            reservation_down: AtomicBool::new(false),
            venue_down: AtomicBool::new(false),
            consume_budget: AtomicI32::new(-1),
            reported_remaining: Mutex::new(None),
            reservation_gate: None,
            trip_after_consume: Mutex::new(None),
            concert_calls: AtomicU32::new(0),
            consume_calls: AtomicU32::new(0),
        }
    }

    /// Reservation lookups wait until `parties` of them are in flight.
    pub fn with_reservation_gate(mut self, parties: usize) -> Self {
        self.reservation_gate = Some(Arc::new(Barrier::new(parties)));
        self
    }

    pub async fn open_concert(&self, name: &str, capacity: i32) -> (Concert, Reservation) {
        let date = NaiveDate::from_ymd_opt(2026, 10, 31).unwrap();
        let venue_id = 100 + self.venues.lock().await.len() as i32;
        self.venues.lock().await.insert(
            venue_id,
            Venue {
                id: venue_id,
                name: format!("{} Hall", name),
                address: "1 Harbour Rd".to_string(),
                city: "Porto".to_string(),
                phone: "351".to_string(),
                capacity,
                owner_id: 1,
            },
        );
        let concert = NewConcert {
            name: name.to_string(),
            description: String::new(),
            venue_id,
            date,
            image: None,
            ticket_price: BigDecimal::from(35),
        };
        let reservation = NewReservation {
            owner_id: 1,
            ticket_number: capacity,
            ticket_price: BigDecimal::from(35),
            starting_date: Utc::now(),
            final_date: date,
        };
        self.store.create_concert(&concert, reservation).await.unwrap()
    }

    pub async fn remaining(&self, reservation_id: ReservationId) -> i32 {
        self.store.remaining(reservation_id).await.unwrap()
    }
}

#[async_trait]
impl ConcertGateway for FakeCluster {
    async fn concert(&self, id: ConcertId) -> ServiceResult<Concert> {
        self.concert_calls.fetch_add(1, Ordering::SeqCst);
        if self.concert_down.load(Ordering::SeqCst) {
            return Err(ServiceError::transient("concert service timed out"));
        }
        self.store
            .concert(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("concert", id))
    }
}

#[async_trait]
impl ReservationGateway for FakeCluster {
    async fn reservation(&self, id: ReservationId) -> ServiceResult<Reservation> {
        if let Some(gate) = &self.reservation_gate {
            gate.wait().await;
        }
        if self.reservation_down.load(Ordering::SeqCst) {
            return Err(ServiceError::transient("concert service returned 503"));
        }
        let mut reservation = self
            .store
            .reservation(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("reservation", id))?;
        if let Some(reported) = *self.reported_remaining.lock().await {
            reservation.ticket_number = reported;
        }
        Ok(reservation)
    }

    async fn consume_one(&self, id: ReservationId) -> ServiceResult<bool> {
        self.consume_calls.fetch_add(1, Ordering::SeqCst);
        let budget = self.consume_budget.load(Ordering::SeqCst);
        if budget == 0 {
            return Err(ServiceError::transient("consume timed out"));
        }
        if budget > 0 {
            self.consume_budget.fetch_sub(1, Ordering::SeqCst);
        }
        let consumed = self.store.try_consume_one(id).await;
        let trip = self.trip_after_consume.lock().await.take();
        if let Some(registry) = trip {
            trip_open(registry.policy(ServiceName::Reservation).circuit_breaker()).await;
        }
        consumed
    }
}

#[async_trait]
impl VenueGateway for FakeCluster {
    async fn venue(&self, id: VenueId) -> ServiceResult<Venue> {
        if self.venue_down.load(Ordering::SeqCst) {
            return Err(ServiceError::transient("venue service unreachable"));
        }
        self.venues
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found("venue", id))
    }
}

/// Feeds transient failures into `breaker` until it opens.
async fn trip_open(breaker: &CircuitBreaker) {
    for _ in 0..100 {
        if breaker.state().await == CircuitState::Open {
            return;
        }
        let _ = breaker
            .call(|| async { Err::<(), _>(ServiceError::transient("concert service returned 503")) })
            .await;
    }
    panic!("breaker never opened");
}

pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<TicketNotification>,
}

impl ChannelNotifier {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<TicketNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, notification: &TicketNotification) -> anyhow::Result<()> {
        self.tx.send(notification.clone())?;
        Ok(())
    }
}

/// A policy set with no retry back-off to wait for and a breaker that opens after `window` failures.
pub fn policy_config(retry_attempts: u32, window: usize) -> ResilienceConfig {
    ResilienceConfig {
        rate_limiter: RateLimiterConfig {
            limit_for_period: 1_000,
            refresh_period_ms: 1_000,
        },
        circuit_breaker: CircuitBreakerConfig {
            failure_rate_threshold: 0.5,
            sliding_window_size: window,
            minimum_number_of_calls: window,
            wait_duration_in_open_state_ms: 30_000,
            permitted_calls_in_half_open_state: 1,
        },
        retry: RetryConfig {
            max_attempts: retry_attempts,
            initial_backoff_ms: 1,
            backoff_multiplier: 1.0,
            max_backoff_ms: 1,
        },
    }
}

pub fn policies(retry_attempts: u32, window: usize) -> Arc<PolicyRegistry> {
    policies_with(policy_config(retry_attempts, window), policy_config(retry_attempts, window))
}

/// Same policy set everywhere except the reservation capability.
pub fn policies_with(default: ResilienceConfig, reservation: ResilienceConfig) -> Arc<PolicyRegistry> {
    let mut settings = ResilienceSettings::default();
    for service in ServiceName::ALL {
        settings.services.insert(service, default.clone());
    }
    settings.services.insert(ServiceName::Reservation, reservation);
    PolicyRegistry::shared(&settings)
}

pub struct Harness {
    pub cluster: Arc<FakeCluster>,
    pub tickets: Arc<MemoryTicketStore>,
    pub handler: Arc<TicketHandler>,
}

pub fn harness(cluster: FakeCluster, notifier: Arc<dyn Notifier>, policies: Arc<PolicyRegistry>) -> Harness {
    let cluster = Arc::new(cluster);
    let tickets = Arc::new(MemoryTicketStore::new());
    let aggregator = Arc::new(Aggregator::new(
        cluster.clone(),
        cluster.clone(),
        cluster.clone(),
        policies.clone(),
    ));
    let admission = AdmissionWorkflow::new(aggregator.clone(), cluster.clone(), tickets.clone(), notifier, policies);
    let handler = Arc::new(TicketHandler::new(tickets.clone(), aggregator, admission));
    Harness { cluster, tickets, handler }
}

pub fn ticket_request(holder: &str) -> TicketRequest {
    TicketRequest {
        holder: holder.to_string(),
        holder_email: format!("{}@example.com", holder),
        phone: "600".to_string(),
    }
}

pub fn purchase(concert_id: ConcertId, holders: &[&str]) -> PurchaseRequest {
    PurchaseRequest {
        concert_id,
        tickets: holders.iter().map(|h| ticket_request(h)).collect(),
    }
}
