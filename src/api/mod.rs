//! HTTP surface: cache health endpoint, resource reads, and admin operations.

pub mod middleware;
pub mod routes;
pub mod server;

pub use server::{build_router, start_server, AppState};
