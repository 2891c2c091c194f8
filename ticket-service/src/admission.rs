use crate::aggregation::Aggregator;
use crate::store::TicketStore;
use shared::gateway::ReservationGateway;
use shared::notification::{dispatch, NotificationKind, Notifier, TicketNotification};
use shared::resilience::PolicyRegistry;
use shared::*;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct AdmissionWorkflow {
    aggregator: Arc<Aggregator>,
    reservations: Arc<dyn ReservationGateway>,
    store: Arc<dyn TicketStore>,
    notifier: Arc<dyn Notifier>,
    policies: Arc<PolicyRegistry>,
}

impl AdmissionWorkflow {
    pub fn new(
        aggregator: Arc<Aggregator>,
        reservations: Arc<dyn ReservationGateway>,
        store: Arc<dyn TicketStore>,
        notifier: Arc<dyn Notifier>,
        policies: Arc<PolicyRegistry>,
    ) -> Self {
        Self { aggregator, reservations, store, notifier, policies }
    }

    /// Tickets issued before a `SoldOut` or `PurchaseIncomplete` stay issued.
    pub async fn purchase(&self, caller: CallerIdentity, request: PurchaseRequest) -> ServiceResult<Vec<TicketView>> {
        validate(&request)?;

        let concert = self.aggregator.concert(request.concert_id).await?;
        let reservation = self.aggregator.reservation(concert.reservation_id).await?;

        let requested = request.tickets.len();
        if requested > reservation.ticket_number.max(0) as usize {
            info!(
                "Rejecting batch of {} for reservation {}: {} remaining",
                requested, reservation.id, reservation.ticket_number
            );
            return Err(ServiceError::InsufficientInventory {
                requested,
                remaining: reservation.ticket_number,
            });
        }

        let mut issued = Vec::with_capacity(requested);
        let outcome = self.admit(&request.tickets, caller, &reservation, &mut issued).await;
        // Holders of tickets issued before an early stop are notified too.
        self.notify_purchased(&issued, &concert);
        outcome?;

        info!(
            "Issued {} tickets for concert {} to user {}",
            issued.len(),
            concert.id,
            caller.user_id
        );
        Ok(self.aggregator.issued_views(issued, &concert, &reservation).await)
    }

    /// Consumes one unit per request, in order, issuing a ticket for each granted unit.
    async fn admit(
        &self,
        requests: &[TicketRequest],
        caller: CallerIdentity,
        reservation: &Reservation,
        issued: &mut Vec<Ticket>,
    ) -> ServiceResult<()> {
        for ticket_request in requests {
            match self.consume_one(reservation.id).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(
                        "Reservation {} sold out after {} of {} tickets for user {}",
                        reservation.id,
                        issued.len(),
                        requests.len(),
                        caller.user_id
                    );
                    return Err(ServiceError::SoldOut);
                }
                Err(err) if err.is_infrastructure() || matches!(err, ServiceError::Unexpected(_)) => {
                    return Err(incomplete(issued, reservation.id, err));
                }
                Err(err) => return Err(err),
            }

            let ticket = Ticket::issue(ticket_request, caller, reservation);
            if let Err(err) = self.store.insert(&ticket).await {
                // The unit is already gone from the ledger.
                error!("Consumed a unit of reservation {} but could not store ticket {}", reservation.id, ticket.id);
                return Err(incomplete(issued, reservation.id, err));
            }
            issued.push(ticket);
        }
        Ok(())
    }

    fn notify_purchased(&self, issued: &[Ticket], concert: &Concert) {
        if issued.is_empty() {
            return;
        }
        let notifications = issued
            .iter()
            .map(|ticket| {
                TicketNotification::new(
                    NotificationKind::Purchase,
                    ticket.clone(),
                    Some(qr_payload(ticket, concert)),
                )
            })
            .collect();
        dispatch(self.notifier.clone(), notifications);
    }

    async fn consume_one(&self, reservation_id: ReservationId) -> ServiceResult<bool> {
        let reservations = &self.reservations;
        self.policies
            .policy(ServiceName::Reservation)
            .execute_once(|| reservations.consume_one(reservation_id))
            .await
    }
}

fn incomplete(issued: &[Ticket], reservation_id: ReservationId, err: ServiceError) -> ServiceError {
    error!(
        "Purchase on reservation {} interrupted after {} tickets: {}",
        reservation_id,
        issued.len(),
        err
    );
    ServiceError::PurchaseIncomplete {
        issued: issued.len(),
        reason: err.to_string(),
    }
}

fn validate(request: &PurchaseRequest) -> ServiceResult<()> {
    if request.tickets.is_empty() {
        return Err(ServiceError::InvalidRequest("purchase needs at least one ticket".to_string()));
    }
    for ticket in &request.tickets {
        if ticket.holder.trim().is_empty() {
            return Err(ServiceError::InvalidRequest("ticket holder is required".to_string()));
        }
        if !ticket.holder_email.contains('@') {
            return Err(ServiceError::InvalidRequest(format!(
                "invalid holder email '{}'",
                ticket.holder_email
            )));
        }
    }
    Ok(())
}
