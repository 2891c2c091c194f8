use crate::ledger::InventoryLedger;
use crate::models::*;
use crate::schema::*;
use crate::store::{ConcertFilter, ConcertStore, NewReservation};
use anyhow::Result;
use async_trait::async_trait;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::PgConnection;
use diesel_async::pooled_connection::{bb8::Pool, AsyncDieselConnectionManager, PoolError};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use shared::*;
use tracing::info;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

type DbPool = Pool<AsyncPgConnection>;

pub fn run_migrations(database_url: &str) -> Result<()> {
    info!("Running database migrations...");
    let mut conn = PgConnection::establish(database_url)?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("Migration error: {}", e))?;
    info!("Migrations completed successfully");
    Ok(())
}

fn storage_error(e: DieselError) -> ServiceError {
    match e {
        DieselError::NotFound => ServiceError::NotFound("record not found".to_string()),
        DieselError::DatabaseError(
            DatabaseErrorKind::UniqueViolation
            | DatabaseErrorKind::ForeignKeyViolation
            | DatabaseErrorKind::NotNullViolation
            | DatabaseErrorKind::CheckViolation,
            info,
        ) => ServiceError::InvalidRequest(format!("constraint violated: {}", info.message())),
        e => ServiceError::Transient(format!("database error: {}", e)),
    }
}

fn pool_error(e: bb8::RunError<PoolError>) -> ServiceError {
    ServiceError::Transient(format!("database unavailable: {}", e))
}

/// Postgres-backed store and ledger.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = Pool::builder().build(config).await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl ConcertStore for PgStore {
    async fn create_concert(
        &self,
        concert: &NewConcert,
        reservation: NewReservation,
    ) -> ServiceResult<(Concert, Reservation)> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let new_concert = NewConcertRow::from(concert);

        let (concert, reservation) = conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                Box::pin(async move {
                    let concert: ConcertRow = diesel::insert_into(concerts::table)
                        .values(&new_concert)
                        .get_result(conn)
                        .await?;

                    let reservation: ReservationRow = diesel::insert_into(reservations::table)
                        .values(&NewReservationRow {
                            concert_id: concert.id,
                            owner_id: reservation.owner_id,
                            ticket_number: reservation.ticket_number,
                            ticket_price: reservation.ticket_price,
                            starting_date: reservation.starting_date,
                            final_date: reservation.final_date,
                        })
                        .get_result(conn)
                        .await?;

                    Ok((concert, reservation))
                })
            })
            .await
            .map_err(storage_error)?;

        info!("Created concert {} with reservation {}", concert.id, reservation.id);
        Ok((concert.into_concert(reservation.id), reservation.into()))
    }

    async fn concert(&self, id: ConcertId) -> ServiceResult<Option<Concert>> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let row = concerts::table
            .inner_join(reservations::table)
            .filter(concerts::id.eq(id))
            .select((concerts::all_columns, reservations::id))
            .first::<(ConcertRow, i32)>(&mut conn)
            .await
            .optional()
            .map_err(storage_error)?;

        Ok(row.map(|(concert, reservation_id)| concert.into_concert(reservation_id)))
    }

    async fn concerts(&self, filter: ConcertFilter) -> ServiceResult<Vec<Concert>> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let query = concerts::table
            .inner_join(reservations::table)
            .select((concerts::all_columns, reservations::id))
            .order((concerts::concert_date.asc(), concerts::id.asc()));

        let rows: Vec<(ConcertRow, i32)> = match filter {
            ConcertFilter::All => query.load(&mut conn).await,
            ConcertFilter::OnDate(date) => {
                query
                    .filter(concerts::concert_date.eq(date))
                    .load(&mut conn)
                    .await
            }
            ConcertFilter::Between(from, to) => {
                query
                    .filter(concerts::concert_date.between(from, to))
                    .load(&mut conn)
                    .await
            }
            ConcertFilter::AtVenue(venue_id) => {
                query
                    .filter(concerts::venue_id.eq(venue_id))
                    .load(&mut conn)
                    .await
            }
            ConcertFilter::OwnedBy(owner_id) => {
                query
                    .filter(reservations::owner_id.eq(owner_id))
                    .load(&mut conn)
                    .await
            }
        }
        .map_err(storage_error)?;

        Ok(rows
            .into_iter()
            .map(|(concert, reservation_id)| concert.into_concert(reservation_id))
            .collect())
    }

    async fn update_concert(&self, id: ConcertId, update: &ConcertUpdate) -> ServiceResult<Option<Concert>> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let update = update.clone();

        let updated = conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                Box::pin(async move {
                    let concert = diesel::update(concerts::table.find(id))
                        .set((
                            concerts::name.eq(update.name),
                            concerts::description.eq(update.description),
                            concerts::venue_id.eq(update.venue_id),
                            concerts::concert_date.eq(update.date),
                            concerts::image.eq(update.image),
                        ))
                        .get_result::<ConcertRow>(conn)
                        .await
                        .optional()?;

                    let Some(concert) = concert else {
                        return Ok(None);
                    };

                    let reservation_id = diesel::update(reservations::table.filter(reservations::concert_id.eq(id)))
                        .set(reservations::ticket_price.eq(update.ticket_price))
                        .returning(reservations::id)
                        .get_result::<i32>(conn)
                        .await?;

                    Ok(Some(concert.into_concert(reservation_id)))
                })
            })
            .await
            .map_err(storage_error)?;

        Ok(updated)
    }

    async fn delete_concert(&self, id: ConcertId) -> ServiceResult<bool> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        let deleted = conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                Box::pin(async move {
                    diesel::delete(reservations::table.filter(reservations::concert_id.eq(id)))
                        .execute(conn)
                        .await?;
                    diesel::delete(concerts::table.find(id)).execute(conn).await
                })
            })
            .await
            .map_err(storage_error)?;

        Ok(deleted > 0)
    }

    async fn reservation(&self, id: ReservationId) -> ServiceResult<Option<Reservation>> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let row = reservations::table
            .find(id)
            .first::<ReservationRow>(&mut conn)
            .await
            .optional()
            .map_err(storage_error)?;

        Ok(row.map(Reservation::from))
    }

    async fn reservations_by_owner(&self, owner_id: UserId) -> ServiceResult<Vec<Reservation>> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let rows = reservations::table
            .filter(reservations::owner_id.eq(owner_id))
            .order(reservations::id.asc())
            .load::<ReservationRow>(&mut conn)
            .await
            .map_err(storage_error)?;

        Ok(rows.into_iter().map(Reservation::from).collect())
    }

    async fn update_reservation(
        &self,
        id: ReservationId,
        update: &ReservationUpdate,
    ) -> ServiceResult<Option<Reservation>> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let row = diesel::update(reservations::table.find(id))
            .set((
                reservations::ticket_number.eq(update.ticket_number),
                reservations::ticket_price.eq(&update.ticket_price),
                reservations::starting_date.eq(update.starting_date),
                reservations::final_date.eq(update.final_date),
            ))
            .get_result::<ReservationRow>(&mut conn)
            .await
            .optional()
            .map_err(storage_error)?;

        Ok(row.map(Reservation::from))
    }
}

#[async_trait]
impl InventoryLedger for PgStore {
    async fn try_consume_one(&self, reservation_id: ReservationId) -> ServiceResult<bool> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        // Check and decrement in one statement; the row lock serializes consumers.
        let updated = diesel::update(
            reservations::table
                .filter(reservations::id.eq(reservation_id))
                .filter(reservations::ticket_number.gt(0)),
        )
        .set(reservations::ticket_number.eq(reservations::ticket_number - 1))
        .execute(&mut conn)
        .await
        .map_err(storage_error)?;

        if updated == 1 {
            return Ok(true);
        }

        let exists = reservations::table
            .find(reservation_id)
            .select(reservations::id)
            .first::<i32>(&mut conn)
            .await
            .optional()
            .map_err(storage_error)?;

        match exists {
            Some(_) => Ok(false),
            None => Err(ServiceError::not_found("reservation", reservation_id)),
        }
    }

    async fn remaining(&self, reservation_id: ReservationId) -> ServiceResult<i32> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        reservations::table
            .find(reservation_id)
            .select(reservations::ticket_number)
            .first::<i32>(&mut conn)
            .await
            .optional()
            .map_err(storage_error)?
            .ok_or_else(|| ServiceError::not_found("reservation", reservation_id))
    }
}
