use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use shared::Ticket;
use uuid::Uuid;

#[derive(Debug, Clone, Queryable, Insertable, Identifiable)]
#[diesel(table_name = crate::schema::tickets)]
pub struct TicketRow {
    pub id: Uuid,
    pub holder: String,
    pub holder_email: String,
    pub buyer_id: i32,
    pub reservation_id: i32,
    pub concert_id: i32,
    pub price: BigDecimal,
    pub purchase_date: DateTime<Utc>,
    pub phone: String,
}

impl From<&Ticket> for TicketRow {
    fn from(ticket: &Ticket) -> Self {
        Self {
            id: ticket.id,
            holder: ticket.holder.clone(),
            holder_email: ticket.holder_email.clone(),
            buyer_id: ticket.buyer_id,
            reservation_id: ticket.reservation_id,
            concert_id: ticket.concert_id,
            price: ticket.price.clone(),
            purchase_date: ticket.purchase_date,
            phone: ticket.phone.clone(),
        }
    }
}

impl From<TicketRow> for Ticket {
    fn from(row: TicketRow) -> Self {
        Self {
            id: row.id,
            holder: row.holder,
            holder_email: row.holder_email,
            buyer_id: row.buyer_id,
            reservation_id: row.reservation_id,
            concert_id: row.concert_id,
            price: row.price,
            purchase_date: row.purchase_date,
            phone: row.phone,
        }
    }
}
