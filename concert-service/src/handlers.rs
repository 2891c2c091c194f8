use crate::ledger::InventoryLedger;
use crate::store::{ConcertFilter, ConcertStore, NewReservation};
use bigdecimal::BigDecimal;
use chrono::{Datelike, NaiveDate, Utc};
use futures::future::join_all;
use shared::gateway::{TicketGateway, VenueGateway};
use shared::notification::{dispatch, NotificationKind, Notifier, TicketNotification};
use shared::resilience::PolicyRegistry;
use shared::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::info;

pub struct ConcertHandler {
    store: Arc<dyn ConcertStore>,
    ledger: Arc<dyn InventoryLedger>,
    venues: Arc<dyn VenueGateway>,
    tickets: Arc<dyn TicketGateway>,
    notifier: Arc<dyn Notifier>,
    policies: Arc<PolicyRegistry>,
}

impl ConcertHandler {
    pub fn new(
        store: Arc<dyn ConcertStore>,
        ledger: Arc<dyn InventoryLedger>,
        venues: Arc<dyn VenueGateway>,
        tickets: Arc<dyn TicketGateway>,
        notifier: Arc<dyn Notifier>,
        policies: Arc<PolicyRegistry>,
    ) -> Self {
        Self { store, ledger, venues, tickets, notifier, policies }
    }

    /// The venue is required here: capacity and owner come from it.
    async fn require_venue(&self, venue_id: VenueId) -> ServiceResult<Venue> {
        let venues = &self.venues;
        self.policies
            .policy(ServiceName::Venue)
            .execute(|| venues.venue(venue_id))
            .await
    }

    async fn optional_venue(&self, venue_id: VenueId) -> ServiceResult<Option<Venue>> {
        let venues = &self.venues;
        self.policies
            .policy(ServiceName::Venue)
            .execute_optional(|| venues.venue(venue_id))
            .await
    }

    pub async fn add_concert(&self, request: NewConcert) -> ServiceResult<ConcertView> {
        validate_price(&request.ticket_price)?;
        let venue = self.require_venue(request.venue_id).await?;
        if venue.capacity < 0 {
            return Err(ServiceError::InvalidRequest(format!(
                "venue {} reports negative capacity",
                venue.id
            )));
        }

        let inventory = NewReservation {
            owner_id: venue.owner_id,
            ticket_number: venue.capacity,
            ticket_price: request.ticket_price.clone(),
            starting_date: Utc::now(),
            final_date: request.date,
        };
        let (concert, reservation) = self.store.create_concert(&request, inventory).await?;

        info!(
            "Concert {} '{}' opened with {} tickets at venue {}",
            concert.id, concert.name, reservation.ticket_number, venue.id
        );
        Ok(ConcertView::assemble(concert, Some(reservation), Some(venue)))
    }

    pub async fn concert(&self, id: ConcertId) -> ServiceResult<Concert> {
        self.store
            .concert(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("concert", id))
    }

    pub async fn concert_view(&self, id: ConcertId) -> ServiceResult<ConcertView> {
        let concert = self.concert(id).await?;
        let reservation = self.store.reservation(concert.reservation_id).await?;
        let venue = self.optional_venue(concert.venue_id).await?;
        Ok(ConcertView::assemble(concert, reservation, venue))
    }

    /// Views for every concert matching `filter`. Each venue is fetched once.
    pub async fn concert_views(&self, filter: ConcertFilter) -> ServiceResult<Vec<ConcertView>> {
        let concerts = self.store.concerts(filter).await?;

        let venue_ids: BTreeSet<VenueId> = concerts.iter().map(|c| c.venue_id).collect();
        let fetched = join_all(venue_ids.into_iter().map(|id| async move {
            (id, self.optional_venue(id).await)
        }))
        .await;

        let mut venues = HashMap::new();
        for (id, venue) in fetched {
            if let Some(venue) = venue? {
                venues.insert(id, venue);
            }
        }

        let mut views = Vec::with_capacity(concerts.len());
        for concert in concerts {
            let reservation = self.store.reservation(concert.reservation_id).await?;
            let venue = venues.get(&concert.venue_id).cloned();
            views.push(ConcertView::assemble(concert, reservation, venue));
        }
        Ok(views)
    }

    pub async fn concerts_in_month(&self, date: NaiveDate) -> ServiceResult<Vec<ConcertView>> {
        let (first, last) = month_bounds(date)?;
        self.concert_views(ConcertFilter::Between(first, last)).await
    }

    pub async fn update_concert(&self, id: ConcertId, update: ConcertUpdate) -> ServiceResult<ConcertView> {
        validate_price(&update.ticket_price)?;
        let existing = self.concert(id).await?;

        let venue = if update.venue_id != existing.venue_id {
            Some(self.require_venue(update.venue_id).await?)
        } else {
            self.optional_venue(update.venue_id).await?
        };

        let concert = self
            .store
            .update_concert(id, &update)
            .await?
            .ok_or_else(|| ServiceError::not_found("concert", id))?;

        if concert.date != existing.date {
            info!("Concert {} moved from {} to {}", id, existing.date, concert.date);
            self.notify_holders(&concert, NotificationKind::Reschedule).await?;
        }

        let reservation = self.store.reservation(concert.reservation_id).await?;
        Ok(ConcertView::assemble(concert, reservation, venue))
    }

    /// Cancels every ticket of the concert, then removes the concert and its reservation.
    /// Holders are taken from a read before the delete, so a delete that is re-sent
    /// after a lost response still notifies everyone.
    pub async fn delete_concert(&self, id: ConcertId) -> ServiceResult<Vec<Ticket>> {
        let concert = self.concert(id).await?;
        let reservation_id = concert.reservation_id;
        let tickets = &self.tickets;
        let policy = self.policies.policy(ServiceName::Ticket);

        let holders = policy
            .execute(|| tickets.tickets_for_reservation(reservation_id))
            .await?;
        let deleted = policy
            .execute(|| tickets.delete_tickets_for_reservation(reservation_id))
            .await?;

        let mut cancelled: BTreeMap<TicketId, Ticket> =
            holders.into_iter().map(|ticket| (ticket.id, ticket)).collect();
        for ticket in deleted {
            cancelled.entry(ticket.id).or_insert(ticket);
        }
        let cancelled: Vec<Ticket> = cancelled.into_values().collect();

        let notifications = cancelled
            .iter()
            .cloned()
            .map(|ticket| TicketNotification::new(NotificationKind::Cancellation, ticket, None))
            .collect();
        dispatch(self.notifier.clone(), notifications);

        self.store.delete_concert(id).await?;
        info!("Concert {} deleted, {} tickets cancelled", id, cancelled.len());
        Ok(cancelled)
    }

    /// A ticket lookup failure skips the notifications instead of failing the update.
    async fn notify_holders(&self, concert: &Concert, kind: NotificationKind) -> ServiceResult<()> {
        let tickets = &self.tickets;
        let holders = self
            .policies
            .policy(ServiceName::Ticket)
            .execute_or_else(|| tickets.tickets_for_reservation(concert.reservation_id), Vec::new)
            .await?;

        if holders.is_empty() {
            return Ok(());
        }

        let notifications = holders
            .into_iter()
            .map(|ticket| {
                let payload = qr_payload(&ticket, concert);
                TicketNotification::new(kind, ticket, Some(payload))
            })
            .collect();
        dispatch(self.notifier.clone(), notifications);
        Ok(())
    }

    pub async fn reservation(&self, id: ReservationId) -> ServiceResult<Reservation> {
        self.store
            .reservation(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("reservation", id))
    }

    pub async fn reservations_by_owner(&self, owner_id: UserId) -> ServiceResult<Vec<Reservation>> {
        self.store.reservations_by_owner(owner_id).await
    }

    pub async fn update_reservation(
        &self,
        id: ReservationId,
        update: ReservationUpdate,
    ) -> ServiceResult<Reservation> {
        if update.ticket_number < 0 {
            return Err(ServiceError::InvalidRequest(
                "ticket_number must not be negative".to_string(),
            ));
        }
        validate_price(&update.ticket_price)?;

        self.store
            .update_reservation(id, &update)
            .await?
            .ok_or_else(|| ServiceError::not_found("reservation", id))
    }

    /// A reservation never outlives its concert, so this removes the concert too.
    pub async fn delete_reservation(&self, id: ReservationId) -> ServiceResult<Vec<Ticket>> {
        let reservation = self.reservation(id).await?;
        info!("Deleting reservation {} with concert {}", id, reservation.concert_id);
        self.delete_concert(reservation.concert_id).await
    }

    pub async fn consume(&self, id: ReservationId) -> ServiceResult<ConsumeResult> {
        let consumed = self.ledger.try_consume_one(id).await?;
        if !consumed {
            info!("Reservation {} is sold out", id);
        }
        Ok(ConsumeResult { consumed })
    }
}

fn validate_price(price: &BigDecimal) -> ServiceResult<()> {
    if *price < BigDecimal::from(0) {
        return Err(ServiceError::InvalidRequest(
            "ticket_price must not be negative".to_string(),
        ));
    }
    Ok(())
}

/// First and last day of the month containing `date`.
pub fn month_bounds(date: NaiveDate) -> ServiceResult<(NaiveDate, NaiveDate)> {
    let invalid = || ServiceError::InvalidRequest(format!("no month for {}", date));
    let first = NaiveDate::from_ymd_opt(date.year(), date.month(), 1).ok_or_else(invalid)?;
    let next = if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
    };
    let last = next.and_then(|d| d.pred_opt()).ok_or_else(invalid)?;
    Ok((first, last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use shared::resilience::{ResilienceConfig, ResilienceSettings, RetryConfig};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use tokio::sync::Mutex;

    struct Venues {
        down: AtomicBool,
    }

    #[async_trait]
    impl VenueGateway for Venues {
        async fn venue(&self, id: VenueId) -> ServiceResult<Venue> {
            if self.down.load(Ordering::SeqCst) {
                return Err(ServiceError::transient("venue service timed out"));
            }
            if id == 404 {
                return Err(ServiceError::not_found("venue", id));
            }
            Ok(Venue {
                id,
                name: format!("Hall {}", id),
                address: "1 Main St".to_string(),
                city: "Springfield".to_string(),
                phone: "555".to_string(),
                capacity: 3,
                owner_id: 70 + id,
            })
        }
    }

    #[derive(Default)]
    struct Tickets {
        issued: Mutex<Vec<Ticket>>,
        down: AtomicBool,
        // Next delete goes through but its response is lost.
        lose_delete_response: AtomicBool,
        delete_calls: AtomicU32,
    }

    #[async_trait]
    impl TicketGateway for Tickets {
        async fn tickets_for_reservation(&self, reservation_id: ReservationId) -> ServiceResult<Vec<Ticket>> {
            if self.down.load(Ordering::SeqCst) {
                return Err(ServiceError::transient("ticket service unreachable"));
            }
            let issued = self.issued.lock().await;
            Ok(issued.iter().filter(|t| t.reservation_id == reservation_id).cloned().collect())
        }

        async fn delete_tickets_for_reservation(&self, reservation_id: ReservationId) -> ServiceResult<Vec<Ticket>> {
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            if self.down.load(Ordering::SeqCst) {
                return Err(ServiceError::transient("ticket service unreachable"));
            }
            let mut issued = self.issued.lock().await;
            let (gone, kept): (Vec<Ticket>, Vec<Ticket>) =
                issued.drain(..).partition(|t| t.reservation_id == reservation_id);
            *issued = kept;
            if self.lose_delete_response.swap(false, Ordering::SeqCst) {
                return Err(ServiceError::transient("ticket service timed out"));
            }
            Ok(gone)
        }
    }

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<TicketNotification>>,
    }

    #[async_trait]
    impl Notifier for Outbox {
        async fn notify(&self, notification: &TicketNotification) -> anyhow::Result<()> {
            self.sent.lock().await.push(notification.clone());
            Ok(())
        }
    }

    struct Fixture {
        handler: ConcertHandler,
        venues: Arc<Venues>,
        tickets: Arc<Tickets>,
        outbox: Arc<Outbox>,
    }

    fn fixture() -> Fixture {
        fixture_with_retries(1)
    }

    fn fixture_with_retries(max_attempts: u32) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let venues = Arc::new(Venues { down: AtomicBool::new(false) });
        let tickets = Arc::new(Tickets::default());
        let outbox = Arc::new(Outbox::default());

        let mut settings = ResilienceSettings::default();
        for service in ServiceName::ALL {
            settings.services.insert(
                service,
                ResilienceConfig {
                    retry: RetryConfig {
                        max_attempts,
                        initial_backoff_ms: 1,
                        backoff_multiplier: 1.0,
                        max_backoff_ms: 1,
                    },
                    ..ResilienceConfig::default()
                },
            );
        }

        let handler = ConcertHandler::new(
            store.clone(),
            store,
            venues.clone(),
            tickets.clone(),
            outbox.clone(),
            PolicyRegistry::shared(&settings),
        );
        Fixture { handler, venues, tickets, outbox }
    }

    fn request(venue_id: VenueId, date: NaiveDate) -> NewConcert {
        NewConcert {
            name: "Aurora".to_string(),
            description: "Live".to_string(),
            venue_id,
            date,
            image: None,
            ticket_price: BigDecimal::from(40),
        }
    }

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    async fn sold(fixture: &Fixture, reservation: &Reservation, holder: &str) {
        let ticket = Ticket::issue(
            &TicketRequest {
                holder: holder.to_string(),
                holder_email: format!("{}@example.com", holder),
                phone: "1".to_string(),
            },
            CallerIdentity::new(1),
            reservation,
        );
        fixture.tickets.issued.lock().await.push(ticket);
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn new_concert_takes_capacity_and_owner_from_venue() {
        let f = fixture();
        let view = f.handler.add_concert(request(2, date(9, 1))).await.unwrap();

        let reservation = f.handler.reservation(view.reservation_id).await.unwrap();
        assert_eq!(reservation.ticket_number, 3);
        assert_eq!(reservation.owner_id, 72);
        assert_eq!(reservation.final_date, date(9, 1));
        assert_eq!(view.venue.unwrap().name, "Hall 2");
    }

    #[tokio::test]
    async fn new_concert_needs_a_reachable_venue() {
        let f = fixture();
        f.venues.down.store(true, Ordering::SeqCst);

        let result = f.handler.add_concert(request(2, date(9, 1))).await;

        assert!(result.unwrap_err().is_transient());
        assert!(f.handler.concert_views(ConcertFilter::All).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_venue_is_not_found() {
        let f = fixture();
        let result = f.handler.add_concert(request(404, date(9, 1))).await;
        assert_eq!(result, Err(ServiceError::not_found("venue", 404)));
    }

    #[tokio::test]
    async fn concert_view_survives_venue_outage() {
        let f = fixture();
        let created = f.handler.add_concert(request(2, date(9, 1))).await.unwrap();
        f.venues.down.store(true, Ordering::SeqCst);

        let view = f.handler.concert_view(created.concert_id).await.unwrap();

        assert_eq!(view.venue, None);
        assert_eq!(view.ticket_number, Some(3));
    }

    #[tokio::test]
    async fn month_listing_covers_whole_month() {
        let f = fixture();
        f.handler.add_concert(request(1, date(2, 1))).await.unwrap();
        f.handler.add_concert(request(1, date(2, 28))).await.unwrap();
        f.handler.add_concert(request(1, date(3, 1))).await.unwrap();

        let views = f.handler.concerts_in_month(date(2, 14)).await.unwrap();

        assert_eq!(views.len(), 2);
        assert!(views.iter().all(|v| v.date.month() == 2));
    }

    #[test]
    fn december_rolls_into_next_year() {
        let (first, last) = month_bounds(date(12, 5)).unwrap();
        assert_eq!(first, date(12, 1));
        assert_eq!(last, date(12, 31));
    }

    #[tokio::test]
    async fn reschedule_notifies_every_holder() {
        let f = fixture();
        let created = f.handler.add_concert(request(1, date(9, 1))).await.unwrap();
        let reservation = f.handler.reservation(created.reservation_id).await.unwrap();
        sold(&f, &reservation, "ada").await;
        sold(&f, &reservation, "lin").await;

        let view = f.handler.update_concert(created.concert_id, request(1, date(9, 8))).await.unwrap();
        settle().await;

        assert_eq!(view.date, date(9, 8));
        let sent = f.outbox.sent.lock().await;
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|n| n.kind == NotificationKind::Reschedule && n.qr_payload.is_some()));
    }

    #[tokio::test]
    async fn reschedule_proceeds_when_ticket_service_is_down() {
        let f = fixture();
        let created = f.handler.add_concert(request(1, date(9, 1))).await.unwrap();
        f.tickets.down.store(true, Ordering::SeqCst);

        let view = f.handler.update_concert(created.concert_id, request(1, date(9, 8))).await.unwrap();

        assert_eq!(view.date, date(9, 8));
        assert!(f.outbox.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn delete_cancels_tickets_then_concert() {
        let f = fixture();
        let created = f.handler.add_concert(request(1, date(9, 1))).await.unwrap();
        let reservation = f.handler.reservation(created.reservation_id).await.unwrap();
        sold(&f, &reservation, "ada").await;

        let cancelled = f.handler.delete_concert(created.concert_id).await.unwrap();
        settle().await;

        assert_eq!(cancelled.len(), 1);
        assert_eq!(f.outbox.sent.lock().await[0].kind, NotificationKind::Cancellation);
        assert!(matches!(
            f.handler.concert(created.concert_id).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_notifies_holders_when_delete_response_is_lost() {
        let f = fixture_with_retries(3);
        let created = f.handler.add_concert(request(1, date(9, 1))).await.unwrap();
        let reservation = f.handler.reservation(created.reservation_id).await.unwrap();
        sold(&f, &reservation, "ada").await;
        sold(&f, &reservation, "lin").await;
        f.tickets.lose_delete_response.store(true, Ordering::SeqCst);

        let cancelled = f.handler.delete_concert(created.concert_id).await.unwrap();
        settle().await;

        assert_eq!(f.tickets.delete_calls.load(Ordering::SeqCst), 2);
        assert_eq!(cancelled.len(), 2);
        assert!(f.tickets.issued.lock().await.is_empty());
        let sent = f.outbox.sent.lock().await;
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|n| n.kind == NotificationKind::Cancellation));
    }

    #[tokio::test]
    async fn delete_is_refused_while_tickets_cannot_be_cancelled() {
        let f = fixture();
        let created = f.handler.add_concert(request(1, date(9, 1))).await.unwrap();
        f.tickets.down.store(true, Ordering::SeqCst);

        let result = f.handler.delete_concert(created.concert_id).await;

        assert!(result.unwrap_err().is_transient());
        assert!(f.handler.concert(created.concert_id).await.is_ok());
    }

    #[tokio::test]
    async fn deleting_a_reservation_removes_its_concert() {
        let f = fixture();
        let created = f.handler.add_concert(request(1, date(9, 1))).await.unwrap();
        let reservation = f.handler.reservation(created.reservation_id).await.unwrap();
        sold(&f, &reservation, "ada").await;

        let cancelled = f.handler.delete_reservation(reservation.id).await.unwrap();
        settle().await;

        assert_eq!(cancelled.len(), 1);
        assert_eq!(f.outbox.sent.lock().await.len(), 1);
        assert!(matches!(
            f.handler.concert(created.concert_id).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(f.handler.concert_views(ConcertFilter::All).await.unwrap().is_empty());
        assert_eq!(
            f.handler.delete_reservation(reservation.id).await,
            Err(ServiceError::not_found("reservation", reservation.id))
        );
    }

    #[tokio::test]
    async fn negative_ticket_number_is_rejected() {
        let f = fixture();
        let created = f.handler.add_concert(request(1, date(9, 1))).await.unwrap();

        let update = ReservationUpdate {
            ticket_number: -1,
            ticket_price: BigDecimal::from(10),
            starting_date: Utc::now(),
            final_date: date(9, 1),
        };
        let result = f.handler.update_reservation(created.reservation_id, update).await;

        assert!(matches!(result, Err(ServiceError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn consume_reports_exhaustion() {
        let f = fixture();
        let created = f.handler.add_concert(request(1, date(9, 1))).await.unwrap();

        for _ in 0..3 {
            assert!(f.handler.consume(created.reservation_id).await.unwrap().consumed);
        }
        assert!(!f.handler.consume(created.reservation_id).await.unwrap().consumed);
    }
}
