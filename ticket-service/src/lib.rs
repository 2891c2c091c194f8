pub mod admission;
pub mod aggregation;
pub mod api;
pub mod handlers;
pub mod models;
pub mod pg;
pub mod schema;
pub mod store;
