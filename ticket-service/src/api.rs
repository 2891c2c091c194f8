use crate::handlers::TicketHandler;
use crate::store::TicketFilter;
use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use shared::*;
use std::sync::Arc;

pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<TicketHandler>,
}

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

/// Caller identity taken from the `x-user-id` header set by the edge.
pub struct Caller(pub CallerIdentity);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<UserId>().ok())
            .ok_or_else(|| ServiceError::InvalidRequest(format!("missing or invalid {} header", USER_ID_HEADER)))?;
        Ok(Caller(CallerIdentity::new(user_id)))
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ticket", get(list_tickets).post(purchase))
        .route("/ticket/mine", get(my_tickets))
        .route("/ticket/:id", get(get_ticket).put(update_ticket).delete(delete_ticket))
        .route("/ticket/concert/:concert_id", get(tickets_by_concert))
        .route("/ticket/email/:email", get(tickets_by_email))
        .route(
            "/ticket/reservation/:reservation_id",
            get(tickets_for_reservation).delete(delete_tickets_for_reservation),
        )
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn purchase(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(request): Json<PurchaseRequest>,
) -> Result<(StatusCode, Json<Vec<TicketView>>), ApiError> {
    let views = state.handler.purchase(caller, request).await?;
    Ok((StatusCode::CREATED, Json(views)))
}

pub async fn list_tickets(State(state): State<AppState>) -> ApiResult<Vec<TicketView>> {
    Ok(Json(state.handler.ticket_views(TicketFilter::All).await?))
}

pub async fn my_tickets(State(state): State<AppState>, Caller(caller): Caller) -> ApiResult<Vec<TicketView>> {
    Ok(Json(state.handler.ticket_views(TicketFilter::Buyer(caller.user_id)).await?))
}

pub async fn get_ticket(State(state): State<AppState>, Path(id): Path<TicketId>) -> ApiResult<TicketView> {
    Ok(Json(state.handler.ticket_view(id).await?))
}

pub async fn update_ticket(
    State(state): State<AppState>,
    Path(id): Path<TicketId>,
    Json(update): Json<TicketUpdate>,
) -> ApiResult<TicketView> {
    Ok(Json(state.handler.update_ticket(id, update).await?))
}

pub async fn delete_ticket(State(state): State<AppState>, Path(id): Path<TicketId>) -> Result<StatusCode, ApiError> {
    state.handler.delete_ticket(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn tickets_by_concert(
    State(state): State<AppState>,
    Path(concert_id): Path<ConcertId>,
) -> ApiResult<Vec<TicketView>> {
    Ok(Json(state.handler.ticket_views(TicketFilter::Concert(concert_id)).await?))
}

pub async fn tickets_by_email(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> ApiResult<Vec<TicketView>> {
    Ok(Json(state.handler.ticket_views(TicketFilter::HolderEmail(email)).await?))
}

pub async fn tickets_for_reservation(
    State(state): State<AppState>,
    Path(reservation_id): Path<ReservationId>,
) -> ApiResult<Vec<Ticket>> {
    Ok(Json(state.handler.tickets_for_reservation(reservation_id).await?))
}

pub async fn delete_tickets_for_reservation(
    State(state): State<AppState>,
    Path(reservation_id): Path<ReservationId>,
) -> ApiResult<Vec<Ticket>> {
    Ok(Json(state.handler.delete_tickets_for_reservation(reservation_id).await?))
}

pub async fn health_check() -> &'static str {
    "OK"
}
