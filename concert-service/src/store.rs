use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use shared::*;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

/// Inventory fields of a reservation created together with its concert.
#[derive(Debug, Clone)]
pub struct NewReservation {
    pub owner_id: UserId,
    pub ticket_number: i32,
    pub ticket_price: BigDecimal,
    pub starting_date: DateTime<Utc>,
    pub final_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConcertFilter {
    All,
    OnDate(NaiveDate),
    Between(NaiveDate, NaiveDate),
    AtVenue(VenueId),
    OwnedBy(UserId),
}

impl ConcertFilter {
    fn matches(&self, concert: &Concert, reservation: &Reservation) -> bool {
        match self {
            ConcertFilter::All => true,
            ConcertFilter::OnDate(date) => concert.date == *date,
            ConcertFilter::Between(from, to) => concert.date >= *from && concert.date <= *to,
            ConcertFilter::AtVenue(venue_id) => concert.venue_id == *venue_id,
            ConcertFilter::OwnedBy(owner_id) => reservation.owner_id == *owner_id,
        }
    }
}

/// Persistence for concerts and their reservations. A concert and its
/// reservation are created and deleted together.
#[async_trait]
pub trait ConcertStore: Send + Sync {
    async fn create_concert(
        &self,
        concert: &NewConcert,
        reservation: NewReservation,
    ) -> ServiceResult<(Concert, Reservation)>;

    async fn concert(&self, id: ConcertId) -> ServiceResult<Option<Concert>>;

    /// Ordered by concert date.
    async fn concerts(&self, filter: ConcertFilter) -> ServiceResult<Vec<Concert>>;

    /// Also applies the new unit price to the concert's reservation.
    async fn update_concert(&self, id: ConcertId, update: &ConcertUpdate) -> ServiceResult<Option<Concert>>;

    async fn delete_concert(&self, id: ConcertId) -> ServiceResult<bool>;

    async fn reservation(&self, id: ReservationId) -> ServiceResult<Option<Reservation>>;

    async fn reservations_by_owner(&self, owner_id: UserId) -> ServiceResult<Vec<Reservation>>;

    async fn update_reservation(
        &self,
        id: ReservationId,
        update: &ReservationUpdate,
    ) -> ServiceResult<Option<Reservation>>;
}

#[derive(Default)]
pub(crate) struct MemoryState {
    pub(crate) concerts: BTreeMap<ConcertId, Concert>,
    pub(crate) reservations: BTreeMap<ReservationId, Reservation>,
    next_concert_id: i32,
    next_reservation_id: i32,
}

/// Store kept entirely in process memory. Used with `--in-memory` and in tests.
#[derive(Default)]
pub struct MemoryStore {
    pub(crate) state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConcertStore for MemoryStore {
    async fn create_concert(
        &self,
        concert: &NewConcert,
        reservation: NewReservation,
    ) -> ServiceResult<(Concert, Reservation)> {
        let mut state = self.state.lock().await;
        state.next_concert_id += 1;
        state.next_reservation_id += 1;

        let concert = Concert {
            id: state.next_concert_id,
            reservation_id: state.next_reservation_id,
            name: concert.name.clone(),
            description: concert.description.clone(),
            venue_id: concert.venue_id,
            date: concert.date,
            image: concert.image.clone(),
        };
        let reservation = Reservation {
            id: state.next_reservation_id,
            concert_id: concert.id,
            owner_id: reservation.owner_id,
            ticket_number: reservation.ticket_number,
            ticket_price: reservation.ticket_price,
            starting_date: reservation.starting_date,
            final_date: reservation.final_date,
        };

        state.concerts.insert(concert.id, concert.clone());
        state.reservations.insert(reservation.id, reservation.clone());
        Ok((concert, reservation))
    }

    async fn concert(&self, id: ConcertId) -> ServiceResult<Option<Concert>> {
        Ok(self.state.lock().await.concerts.get(&id).cloned())
    }

    async fn concerts(&self, filter: ConcertFilter) -> ServiceResult<Vec<Concert>> {
        let state = self.state.lock().await;
        let mut concerts: Vec<Concert> = state
            .concerts
            .values()
            .filter(|concert| {
                state
                    .reservations
                    .get(&concert.reservation_id)
                    .map(|reservation| filter.matches(concert, reservation))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        concerts.sort_by_key(|c| (c.date, c.id));
        Ok(concerts)
    }

    async fn update_concert(&self, id: ConcertId, update: &ConcertUpdate) -> ServiceResult<Option<Concert>> {
        let mut state = self.state.lock().await;
        let Some(concert) = state.concerts.get_mut(&id) else {
            return Ok(None);
        };
        concert.name = update.name.clone();
        concert.description = update.description.clone();
        concert.venue_id = update.venue_id;
        concert.date = update.date;
        concert.image = update.image.clone();
        let updated = concert.clone();

        if let Some(reservation) = state.reservations.get_mut(&updated.reservation_id) {
            reservation.ticket_price = update.ticket_price.clone();
        }
        Ok(Some(updated))
    }

    async fn delete_concert(&self, id: ConcertId) -> ServiceResult<bool> {
        let mut state = self.state.lock().await;
        match state.concerts.remove(&id) {
            Some(concert) => {
                state.reservations.remove(&concert.reservation_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn reservation(&self, id: ReservationId) -> ServiceResult<Option<Reservation>> {
        Ok(self.state.lock().await.reservations.get(&id).cloned())
    }

    async fn reservations_by_owner(&self, owner_id: UserId) -> ServiceResult<Vec<Reservation>> {
        Ok(self
            .state
            .lock()
            .await
            .reservations
            .values()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn update_reservation(
        &self,
        id: ReservationId,
        update: &ReservationUpdate,
    ) -> ServiceResult<Option<Reservation>> {
        let mut state = self.state.lock().await;
        Ok(state.reservations.get_mut(&id).map(|reservation| {
            reservation.ticket_number = update.ticket_number;
            reservation.ticket_price = update.ticket_price.clone();
            reservation.starting_date = update.starting_date;
            reservation.final_date = update.final_date;
            reservation.clone()
        }))
    }
}
