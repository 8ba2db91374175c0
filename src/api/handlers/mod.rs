//! Ping service request handlers

pub mod health;
pub mod ping;
pub mod rate;
