use crate::store::MemoryStore;
use async_trait::async_trait;
use shared::*;

/// Check and decrement must be one atomic step.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// `Ok(false)` when the reservation exists but is exhausted.
    async fn try_consume_one(&self, reservation_id: ReservationId) -> ServiceResult<bool>;

    async fn remaining(&self, reservation_id: ReservationId) -> ServiceResult<i32>;
}

#[async_trait]
impl InventoryLedger for MemoryStore {
    async fn try_consume_one(&self, reservation_id: ReservationId) -> ServiceResult<bool> {
        let mut state = self.state.lock().await;
        let reservation = state
            .reservations
            .get_mut(&reservation_id)
            .ok_or_else(|| ServiceError::not_found("reservation", reservation_id))?;

        if reservation.ticket_number > 0 {
            reservation.ticket_number -= 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn remaining(&self, reservation_id: ReservationId) -> ServiceResult<i32> {
        self.state
            .lock()
            .await
            .reservations
            .get(&reservation_id)
            .map(|r| r.ticket_number)
            .ok_or_else(|| ServiceError::not_found("reservation", reservation_id))
    }
}
