//! Ping service
//!
//! Small HTTP surface over the probe engine: on-demand pings for other
//! tools and read access to the persisted success rates.

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;

pub use server::{AppState, PingServer};
