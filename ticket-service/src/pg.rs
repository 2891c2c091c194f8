use crate::models::TicketRow;
use crate::schema::tickets;
use crate::store::{TicketFilter, TicketStore};
use anyhow::Result;
use async_trait::async_trait;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::PgConnection;
use diesel_async::pooled_connection::{bb8::Pool, AsyncDieselConnectionManager, PoolError};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
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

#[derive(Clone)]
pub struct PgTicketStore {
    pool: DbPool,
}

impl PgTicketStore {
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
impl TicketStore for PgTicketStore {
    async fn insert(&self, ticket: &Ticket) -> ServiceResult<()> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        diesel::insert_into(tickets::table)
            .values(&TicketRow::from(ticket))
            .execute(&mut conn)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn ticket(&self, id: TicketId) -> ServiceResult<Option<Ticket>> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let row = tickets::table
            .find(id)
            .first::<TicketRow>(&mut conn)
            .await
            .optional()
            .map_err(storage_error)?;
        Ok(row.map(Ticket::from))
    }

    async fn tickets(&self, filter: TicketFilter) -> ServiceResult<Vec<Ticket>> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let query = tickets::table.order(tickets::purchase_date.asc());

        let rows: Vec<TicketRow> = match filter {
            TicketFilter::All => query.load(&mut conn).await,
            TicketFilter::Concert(concert_id) => {
                query
                    .filter(tickets::concert_id.eq(concert_id))
                    .load(&mut conn)
                    .await
            }
            TicketFilter::HolderEmail(email) => {
                query
                    .filter(tickets::holder_email.eq(email))
                    .load(&mut conn)
                    .await
            }
            TicketFilter::Buyer(user_id) => {
                query
                    .filter(tickets::buyer_id.eq(user_id))
                    .load(&mut conn)
                    .await
            }
            TicketFilter::Reservation(reservation_id) => {
                query
                    .filter(tickets::reservation_id.eq(reservation_id))
                    .load(&mut conn)
                    .await
            }
        }
        .map_err(storage_error)?;

        Ok(rows.into_iter().map(Ticket::from).collect())
    }

    async fn update(&self, id: TicketId, update: &TicketUpdate) -> ServiceResult<Option<Ticket>> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let row = diesel::update(tickets::table.find(id))
            .set((
                tickets::holder.eq(&update.holder),
                tickets::holder_email.eq(&update.holder_email),
                tickets::phone.eq(&update.phone),
            ))
            .get_result::<TicketRow>(&mut conn)
            .await
            .optional()
            .map_err(storage_error)?;
        Ok(row.map(Ticket::from))
    }

    async fn delete(&self, id: TicketId) -> ServiceResult<bool> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let deleted = diesel::delete(tickets::table.find(id))
            .execute(&mut conn)
            .await
            .map_err(storage_error)?;
        Ok(deleted > 0)
    }

    async fn delete_for_reservation(&self, reservation_id: ReservationId) -> ServiceResult<Vec<Ticket>> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let rows = diesel::delete(tickets::table.filter(tickets::reservation_id.eq(reservation_id)))
            .returning(tickets::all_columns)
            .get_results::<TicketRow>(&mut conn)
            .await
            .map_err(storage_error)?;

        info!("Deleted {} tickets of reservation {}", rows.len(), reservation_id);
        Ok(rows.into_iter().map(Ticket::from).collect())
    }
}
