use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type ConcertId = i32;
pub type ReservationId = i32;
pub type VenueId = i32;
pub type UserId = i32;
pub type TicketId = Uuid;

/// Logical name of a remote capability. Each one gets its own resilience policy set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceName {
    Concert,
    Venue,
    Reservation,
    Ticket,
}

impl ServiceName {
    pub const ALL: [ServiceName; 4] = [
        ServiceName::Concert,
        ServiceName::Venue,
        ServiceName::Reservation,
        ServiceName::Ticket,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceName::Concert => "concert",
            ServiceName::Venue => "venue",
            ServiceName::Reservation => "reservation",
            ServiceName::Ticket => "ticket",
        }
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller identity, resolved once at the HTTP boundary and passed into every workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub user_id: UserId,
}

impl CallerIdentity {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub id: VenueId,
    pub name: String,
    pub address: String,
    pub city: String,
    pub phone: String,
    pub capacity: i32,
    pub owner_id: UserId,
}

/// Inventory ledger entry. `ticket_number` is the remaining sellable count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub concert_id: ConcertId,
    pub owner_id: UserId,
    pub ticket_number: i32,
    pub ticket_price: BigDecimal,
    pub starting_date: DateTime<Utc>,
    pub final_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concert {
    pub id: ConcertId,
    pub reservation_id: ReservationId,
    pub name: String,
    pub description: String,
    pub venue_id: VenueId,
    pub date: NaiveDate,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub holder: String,
    pub holder_email: String,
    pub buyer_id: UserId,
    pub reservation_id: ReservationId,
    pub concert_id: ConcertId,
    pub price: BigDecimal,
    pub purchase_date: DateTime<Utc>,
    pub phone: String,
}

impl Ticket {
    /// Materializes a ticket for a consumed unit. The price is a snapshot of the
    /// reservation's unit price and never changes afterwards.
    pub fn issue(request: &TicketRequest, buyer: CallerIdentity, reservation: &Reservation) -> Self {
        Self {
            id: Uuid::new_v4(),
            holder: request.holder.clone(),
            holder_email: request.holder_email.clone(),
            buyer_id: buyer.user_id,
            reservation_id: reservation.id,
            concert_id: reservation.concert_id,
            price: reservation.ticket_price.clone(),
            purchase_date: Utc::now(),
            phone: request.phone.clone(),
        }
    }
}

/// Payload encoded into a ticket's QR code. Needs the resolved concert.
pub fn qr_payload(ticket: &Ticket, concert: &Concert) -> String {
    serde_json::json!({
        "ticket_id": ticket.id,
        "holder": ticket.holder,
        "holder_email": ticket.holder_email,
        "concert_id": concert.id,
        "concert_name": concert.name,
        "concert_date": concert.date,
        "purchase_date": ticket.purchase_date,
    })
    .to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketRequest {
    pub holder: String,
    pub holder_email: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub concert_id: ConcertId,
    pub tickets: Vec<TicketRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketUpdate {
    pub holder: String,
    pub holder_email: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConcert {
    pub name: String,
    pub description: String,
    pub venue_id: VenueId,
    pub date: NaiveDate,
    pub image: Option<String>,
    pub ticket_price: BigDecimal,
}

pub type ConcertUpdate = NewConcert;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationUpdate {
    pub ticket_number: i32,
    pub ticket_price: BigDecimal,
    pub starting_date: DateTime<Utc>,
    pub final_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeResult {
    pub consumed: bool,
}

/// Denormalized concert read-model. Fields resolved from other services are
/// optional: a degraded owner leaves them empty instead of failing the view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcertView {
    pub concert_id: ConcertId,
    pub reservation_id: ReservationId,
    pub name: String,
    pub description: String,
    pub date: NaiveDate,
    pub image: Option<String>,
    pub venue_id: VenueId,
    pub venue: Option<Venue>,
    pub ticket_number: Option<i32>,
    pub ticket_price: Option<BigDecimal>,
}

impl ConcertView {
    pub fn assemble(concert: Concert, reservation: Option<Reservation>, venue: Option<Venue>) -> Self {
        Self {
            concert_id: concert.id,
            reservation_id: concert.reservation_id,
            name: concert.name,
            description: concert.description,
            date: concert.date,
            image: concert.image,
            venue_id: concert.venue_id,
            venue,
            ticket_number: reservation.as_ref().map(|r| r.ticket_number),
            ticket_price: reservation.map(|r| r.ticket_price),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketView {
    pub ticket_id: TicketId,
    pub holder: String,
    pub holder_email: String,
    pub buyer_id: UserId,
    pub concert_id: ConcertId,
    pub concert: ConcertView,
    pub price: BigDecimal,
    pub purchase_date: DateTime<Utc>,
    pub phone: String,
    pub qr_payload: String,
}

impl TicketView {
    pub fn assemble(ticket: Ticket, concert: &Concert, concert_view: ConcertView) -> Self {
        let qr_payload = qr_payload(&ticket, concert);
        Self {
            ticket_id: ticket.id,
            holder: ticket.holder,
            holder_email: ticket.holder_email,
            buyer_id: ticket.buyer_id,
            concert_id: ticket.concert_id,
            concert: concert_view,
            price: ticket.price,
            purchase_date: ticket.purchase_date,
            phone: ticket.phone,
            qr_payload,
        }
    }
}
