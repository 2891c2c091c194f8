use crate::handlers::ConcertHandler;
use crate::store::ConcertFilter;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use shared::*;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<ConcertHandler>,
}

/// Service error rendered as `{kind, error}` with the matching status code.
pub struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        }
        (status, Json(ErrorResponse::from(&self.0))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/concert", post(add_concert).get(list_concerts))
        .route("/concert/:id", get(get_concert).put(update_concert).delete(delete_concert))
        .route("/concert/:id/details", get(concert_details))
        .route("/concert/date/:date", get(concerts_by_date))
        .route("/concert/month/:date", get(concerts_by_month))
        .route("/concert/venue/:venue_id", get(concerts_by_venue))
        .route("/concert/owner/:user_id", get(concerts_by_owner))
        .route(
            "/reservation/:id",
            get(get_reservation).put(update_reservation).delete(delete_reservation),
        )
        .route("/reservation/:id/consume", post(consume))
        .route("/reservation/owner/:user_id", get(reservations_by_owner))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn add_concert(
    State(state): State<AppState>,
    Json(request): Json<NewConcert>,
) -> Result<(StatusCode, Json<ConcertView>), ApiError> {
    let view = state.handler.add_concert(request).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn list_concerts(State(state): State<AppState>) -> ApiResult<Vec<ConcertView>> {
    Ok(Json(state.handler.concert_views(ConcertFilter::All).await?))
}

pub async fn get_concert(State(state): State<AppState>, Path(id): Path<ConcertId>) -> ApiResult<Concert> {
    Ok(Json(state.handler.concert(id).await?))
}

pub async fn concert_details(
    State(state): State<AppState>,
    Path(id): Path<ConcertId>,
) -> ApiResult<ConcertView> {
    Ok(Json(state.handler.concert_view(id).await?))
}

pub async fn concerts_by_date(
    State(state): State<AppState>,
    Path(date): Path<NaiveDate>,
) -> ApiResult<Vec<ConcertView>> {
    Ok(Json(state.handler.concert_views(ConcertFilter::OnDate(date)).await?))
}

pub async fn concerts_by_month(
    State(state): State<AppState>,
    Path(date): Path<NaiveDate>,
) -> ApiResult<Vec<ConcertView>> {
    Ok(Json(state.handler.concerts_in_month(date).await?))
}

pub async fn concerts_by_venue(
    State(state): State<AppState>,
    Path(venue_id): Path<VenueId>,
) -> ApiResult<Vec<ConcertView>> {
    Ok(Json(state.handler.concert_views(ConcertFilter::AtVenue(venue_id)).await?))
}

pub async fn concerts_by_owner(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> ApiResult<Vec<ConcertView>> {
    Ok(Json(state.handler.concert_views(ConcertFilter::OwnedBy(user_id)).await?))
}

pub async fn update_concert(
    State(state): State<AppState>,
    Path(id): Path<ConcertId>,
    Json(update): Json<ConcertUpdate>,
) -> ApiResult<ConcertView> {
    Ok(Json(state.handler.update_concert(id, update).await?))
}

pub async fn delete_concert(
    State(state): State<AppState>,
    Path(id): Path<ConcertId>,
) -> ApiResult<Vec<Ticket>> {
    Ok(Json(state.handler.delete_concert(id).await?))
}

pub async fn get_reservation(
    State(state): State<AppState>,
    Path(id): Path<ReservationId>,
) -> ApiResult<Reservation> {
    Ok(Json(state.handler.reservation(id).await?))
}

pub async fn reservations_by_owner(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> ApiResult<Vec<Reservation>> {
    Ok(Json(state.handler.reservations_by_owner(user_id).await?))
}

pub async fn update_reservation(
    State(state): State<AppState>,
    Path(id): Path<ReservationId>,
    Json(update): Json<ReservationUpdate>,
) -> ApiResult<Reservation> {
    Ok(Json(state.handler.update_reservation(id, update).await?))
}

pub async fn delete_reservation(
    State(state): State<AppState>,
    Path(id): Path<ReservationId>,
) -> ApiResult<Vec<Ticket>> {
    Ok(Json(state.handler.delete_reservation(id).await?))
}

pub async fn consume(
    State(state): State<AppState>,
    Path(id): Path<ReservationId>,
) -> ApiResult<ConsumeResult> {
    Ok(Json(state.handler.consume(id).await?))
}

pub async fn health_check() -> &'static str {
    "OK"
}
