pub mod api;
pub mod handlers;
pub mod ledger;
pub mod models;
pub mod pg;
pub mod schema;
pub mod store;
