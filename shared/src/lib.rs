pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod notification;
pub mod resilience;

pub use error::{ErrorResponse, ServiceError, ServiceResult};
pub use models::*;
