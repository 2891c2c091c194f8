use async_trait::async_trait;
use shared::*;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub enum TicketFilter {
    All,
    Concert(ConcertId),
    HolderEmail(String),
    Buyer(UserId),
    Reservation(ReservationId),
}

impl TicketFilter {
    fn matches(&self, ticket: &Ticket) -> bool {
        match self {
            TicketFilter::All => true,
            TicketFilter::Concert(id) => ticket.concert_id == *id,
            TicketFilter::HolderEmail(email) => ticket.holder_email == *email,
            TicketFilter::Buyer(user_id) => ticket.buyer_id == *user_id,
            TicketFilter::Reservation(id) => ticket.reservation_id == *id,
        }
    }
}

#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn insert(&self, ticket: &Ticket) -> ServiceResult<()>;

    async fn ticket(&self, id: TicketId) -> ServiceResult<Option<Ticket>>;

    /// Oldest purchase first.
    async fn tickets(&self, filter: TicketFilter) -> ServiceResult<Vec<Ticket>>;

    /// Only holder details change. The price snapshot stays as issued.
    async fn update(&self, id: TicketId, update: &TicketUpdate) -> ServiceResult<Option<Ticket>>;

    async fn delete(&self, id: TicketId) -> ServiceResult<bool>;

    async fn delete_for_reservation(&self, reservation_id: ReservationId) -> ServiceResult<Vec<Ticket>>;
}

#[derive(Default)]
pub struct MemoryTicketStore {
    tickets: Mutex<Vec<Ticket>>,
}

impl MemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    async fn insert(&self, ticket: &Ticket) -> ServiceResult<()> {
        self.tickets.lock().await.push(ticket.clone());
        Ok(())
    }

    async fn ticket(&self, id: TicketId) -> ServiceResult<Option<Ticket>> {
        Ok(self.tickets.lock().await.iter().find(|t| t.id == id).cloned())
    }

    async fn tickets(&self, filter: TicketFilter) -> ServiceResult<Vec<Ticket>> {
        let mut tickets: Vec<Ticket> = self
            .tickets
            .lock()
            .await
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.purchase_date);
        Ok(tickets)
    }

    async fn update(&self, id: TicketId, update: &TicketUpdate) -> ServiceResult<Option<Ticket>> {
        let mut tickets = self.tickets.lock().await;
        Ok(tickets.iter_mut().find(|t| t.id == id).map(|ticket| {
            ticket.holder = update.holder.clone();
            ticket.holder_email = update.holder_email.clone();
            ticket.phone = update.phone.clone();
            ticket.clone()
        }))
    }

    async fn delete(&self, id: TicketId) -> ServiceResult<bool> {
        let mut tickets = self.tickets.lock().await;
        let before = tickets.len();
        tickets.retain(|t| t.id != id);
        Ok(tickets.len() < before)
    }

    async fn delete_for_reservation(&self, reservation_id: ReservationId) -> ServiceResult<Vec<Ticket>> {
        let mut tickets = self.tickets.lock().await;
        let (deleted, kept): (Vec<Ticket>, Vec<Ticket>) = tickets
            .drain(..)
            .partition(|t| t.reservation_id == reservation_id);
        *tickets = kept;
        Ok(deleted)
    }
}
