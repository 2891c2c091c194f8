use futures::future::try_join_all;
use shared::gateway::{ConcertGateway, ReservationGateway, VenueGateway};
use shared::resilience::PolicyRegistry;
use shared::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Concert and reservation are essential to a ticket view. The venue degrades to `None`.
pub struct Aggregator {
    concerts: Arc<dyn ConcertGateway>,
    reservations: Arc<dyn ReservationGateway>,
    venues: Arc<dyn VenueGateway>,
    policies: Arc<PolicyRegistry>,
}

/// Resolved context shared by every ticket of one concert.
#[derive(Debug, Clone)]
struct TicketContext {
    concert: Concert,
    view: ConcertView,
}

impl Aggregator {
    pub fn new(
        concerts: Arc<dyn ConcertGateway>,
        reservations: Arc<dyn ReservationGateway>,
        venues: Arc<dyn VenueGateway>,
        policies: Arc<PolicyRegistry>,
    ) -> Self {
        Self { concerts, reservations, venues, policies }
    }

    pub async fn concert(&self, id: ConcertId) -> ServiceResult<Concert> {
        let concerts = &self.concerts;
        self.policies
            .policy(ServiceName::Concert)
            .execute(|| concerts.concert(id))
            .await
    }

    pub async fn reservation(&self, id: ReservationId) -> ServiceResult<Reservation> {
        let reservations = &self.reservations;
        self.policies
            .policy(ServiceName::Reservation)
            .execute(|| reservations.reservation(id))
            .await
    }

    async fn optional_reservation(&self, id: ReservationId) -> ServiceResult<Option<Reservation>> {
        let reservations = &self.reservations;
        self.policies
            .policy(ServiceName::Reservation)
            .execute_optional(|| reservations.reservation(id))
            .await
    }

    pub async fn optional_venue(&self, id: VenueId) -> ServiceResult<Option<Venue>> {
        let venues = &self.venues;
        self.policies
            .policy(ServiceName::Venue)
            .execute_optional(|| venues.venue(id))
            .await
    }

    pub async fn concert_view(&self, id: ConcertId) -> ServiceResult<ConcertView> {
        let concert = self.concert(id).await?;
        let (reservation, venue) = tokio::try_join!(
            self.optional_reservation(concert.reservation_id),
            self.optional_venue(concert.venue_id),
        )?;
        Ok(ConcertView::assemble(concert, reservation, venue))
    }

    async fn ticket_context(&self, concert_id: ConcertId, reservation_id: ReservationId) -> ServiceResult<TicketContext> {
        let (concert, reservation) = tokio::try_join!(self.concert(concert_id), self.reservation(reservation_id))?;
        let venue = self.optional_venue(concert.venue_id).await?;
        let view = ConcertView::assemble(concert.clone(), Some(reservation), venue);
        Ok(TicketContext { concert, view })
    }

    pub async fn ticket_view(&self, ticket: Ticket) -> ServiceResult<TicketView> {
        let context = self.ticket_context(ticket.concert_id, ticket.reservation_id).await?;
        Ok(TicketView::assemble(ticket, &context.concert, context.view))
    }

    /// Views for a batch of tickets. Context is fetched once per concert.
    pub async fn ticket_views(&self, tickets: Vec<Ticket>) -> ServiceResult<Vec<TicketView>> {
        let keys: BTreeMap<ConcertId, ReservationId> = tickets
            .iter()
            .map(|t| (t.concert_id, t.reservation_id))
            .collect();

        let contexts = try_join_all(keys.into_iter().map(|(concert_id, reservation_id)| async move {
            let context = self.ticket_context(concert_id, reservation_id).await?;
            Ok::<_, ServiceError>((concert_id, context))
        }))
        .await?;
        let contexts: HashMap<ConcertId, TicketContext> = contexts.into_iter().collect();

        tickets
            .into_iter()
            .map(|ticket| -> ServiceResult<TicketView> {
                let context = contexts
                    .get(&ticket.concert_id)
                    .ok_or_else(|| ServiceError::not_found("concert", ticket.concert_id))?;
                Ok(TicketView::assemble(ticket, &context.concert, context.view.clone()))
            })
            .collect()
    }

    /// Views for freshly issued tickets whose context the caller already holds.
    /// Never fails: the tickets exist, so a venue error only leaves the venue empty.
    pub async fn issued_views(
        &self,
        tickets: Vec<Ticket>,
        concert: &Concert,
        reservation: &Reservation,
    ) -> Vec<TicketView> {
        let venue = self.optional_venue(concert.venue_id).await.ok().flatten();
        let view = ConcertView::assemble(concert.clone(), Some(reservation.clone()), venue);
        tickets
            .into_iter()
            .map(|ticket| TicketView::assemble(ticket, concert, view.clone()))
            .collect()
    }
}
