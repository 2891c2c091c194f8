use crate::admission::AdmissionWorkflow;
use crate::aggregation::Aggregator;
use crate::store::{TicketFilter, TicketStore};
use shared::*;
use std::sync::Arc;
use tracing::info;

pub struct TicketHandler {
    store: Arc<dyn TicketStore>,
    aggregator: Arc<Aggregator>,
    admission: AdmissionWorkflow,
}

impl TicketHandler {
    pub fn new(store: Arc<dyn TicketStore>, aggregator: Arc<Aggregator>, admission: AdmissionWorkflow) -> Self {
        Self { store, aggregator, admission }
    }

    pub async fn purchase(&self, caller: CallerIdentity, request: PurchaseRequest) -> ServiceResult<Vec<TicketView>> {
        self.admission.purchase(caller, request).await
    }

    async fn ticket(&self, id: TicketId) -> ServiceResult<Ticket> {
        self.store
            .ticket(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("ticket", id))
    }

    pub async fn ticket_view(&self, id: TicketId) -> ServiceResult<TicketView> {
        let ticket = self.ticket(id).await?;
        self.aggregator.ticket_view(ticket).await
    }

    pub async fn ticket_views(&self, filter: TicketFilter) -> ServiceResult<Vec<TicketView>> {
        let tickets = self.store.tickets(filter).await?;
        self.aggregator.ticket_views(tickets).await
    }

    pub async fn tickets_for_reservation(&self, reservation_id: ReservationId) -> ServiceResult<Vec<Ticket>> {
        self.store.tickets(TicketFilter::Reservation(reservation_id)).await
    }

    pub async fn update_ticket(&self, id: TicketId, update: TicketUpdate) -> ServiceResult<TicketView> {
        if update.holder.trim().is_empty() || !update.holder_email.contains('@') {
            return Err(ServiceError::InvalidRequest(
                "holder and a valid holder email are required".to_string(),
            ));
        }
        let ticket = self
            .store
            .update(id, &update)
            .await?
            .ok_or_else(|| ServiceError::not_found("ticket", id))?;
        self.aggregator.ticket_view(ticket).await
    }

    /// The unit consumed for this ticket is not returned to the reservation.
    pub async fn delete_ticket(&self, id: TicketId) -> ServiceResult<()> {
        if !self.store.delete(id).await? {
            return Err(ServiceError::not_found("ticket", id));
        }
        info!("Ticket {} deleted", id);
        Ok(())
    }

    pub async fn delete_tickets_for_reservation(&self, reservation_id: ReservationId) -> ServiceResult<Vec<Ticket>> {
        self.store.delete_for_reservation(reservation_id).await
    }
}
