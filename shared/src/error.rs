use crate::models::ServiceName;
use thiserror::Error;

/// Failure taxonomy shared by every service.
///
/// Business errors (`NotFound`, `SoldOut`, `InsufficientInventory`, `InvalidRequest`)
/// always reach the caller unmodified. Infrastructure errors (`Transient`,
/// `RateLimited`, `CircuitOpen`) may be absorbed by a fallback on read paths.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("tickets are sold out")]
    SoldOut,

    #[error("not enough tickets available: requested {requested}, remaining {remaining}")]
    InsufficientInventory { requested: usize, remaining: i32 },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("rate limit exceeded for {0} service")]
    RateLimited(ServiceName),

    #[error("circuit breaker open for {0} service")]
    CircuitOpen(ServiceName),

    #[error("purchase incomplete after {issued} ticket(s), retry later: {reason}")]
    PurchaseIncomplete { issued: usize, reason: String },

    #[error("unexpected response: {0}")]
    Unexpected(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn not_found(resource: &str, id: impl std::fmt::Display) -> Self {
        ServiceError::NotFound(format!("{} {}", resource, id))
    }

    pub fn transient(err: impl std::fmt::Display) -> Self {
        ServiceError::Transient(err.to_string())
    }

    /// Eligible for retry and counted by the circuit breaker.
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Transient(_))
    }

    /// Degradation of the infrastructure rather than a business outcome.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            ServiceError::Transient(_) | ServiceError::RateLimited(_) | ServiceError::CircuitOpen(_)
        )
    }

    /// Stable machine-readable tag, carried in HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => "not_found",
            ServiceError::SoldOut => "sold_out",
            ServiceError::InsufficientInventory { .. } => "insufficient_inventory",
            ServiceError::InvalidRequest(_) => "invalid_request",
            ServiceError::Transient(_) => "transient",
            ServiceError::RateLimited(_) => "rate_limited",
            ServiceError::CircuitOpen(_) => "circuit_open",
            ServiceError::PurchaseIncomplete { .. } => "purchase_incomplete",
            ServiceError::Unexpected(_) => "unexpected",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::NotFound(_) => 404,
            ServiceError::SoldOut | ServiceError::InsufficientInventory { .. } => 409,
            ServiceError::InvalidRequest(_) => 400,
            ServiceError::RateLimited(_) => 429,
            ServiceError::Transient(_)
            | ServiceError::CircuitOpen(_)
            | ServiceError::PurchaseIncomplete { .. } => 503,
            ServiceError::Unexpected(_) => 502,
        }
    }
}

/// Body of every non-2xx response produced by the services.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    pub kind: String,
    pub error: String,
}

impl From<&ServiceError> for ErrorResponse {
    fn from(err: &ServiceError) -> Self {
        Self {
            kind: err.kind().to_string(),
            error: err.to_string(),
        }
    }
}
