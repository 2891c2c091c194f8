use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use shared::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = crate::schema::concerts)]
pub struct ConcertRow {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub venue_id: i32,
    pub concert_date: NaiveDate,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::concerts)]
pub struct NewConcertRow {
    pub name: String,
    pub description: String,
    pub venue_id: i32,
    pub concert_date: NaiveDate,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = crate::schema::reservations)]
pub struct ReservationRow {
    pub id: i32,
    pub concert_id: i32,
    pub owner_id: i32,
    pub ticket_number: i32,
    pub ticket_price: BigDecimal,
    pub starting_date: DateTime<Utc>,
    pub final_date: NaiveDate,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::reservations)]
pub struct NewReservationRow {
    pub concert_id: i32,
    pub owner_id: i32,
    pub ticket_number: i32,
    pub ticket_price: BigDecimal,
    pub starting_date: DateTime<Utc>,
    pub final_date: NaiveDate,
}

impl ConcertRow {
    pub fn into_concert(self, reservation_id: ReservationId) -> Concert {
        Concert {
            id: self.id,
            reservation_id,
            name: self.name,
            description: self.description,
            venue_id: self.venue_id,
            date: self.concert_date,
            image: self.image,
        }
    }
}

impl From<&NewConcert> for NewConcertRow {
    fn from(concert: &NewConcert) -> Self {
        Self {
            name: concert.name.clone(),
            description: concert.description.clone(),
            venue_id: concert.venue_id,
            concert_date: concert.date,
            image: concert.image.clone(),
        }
    }
}

impl From<ReservationRow> for Reservation {
    fn from(row: ReservationRow) -> Self {
        Self {
            id: row.id,
            concert_id: row.concert_id,
            owner_id: row.owner_id,
            ticket_number: row.ticket_number,
            ticket_price: row.ticket_price,
            starting_date: row.starting_date,
            final_date: row.final_date,
        }
    }
}
