//! Ping service middleware

pub mod logging;

pub use logging::RequestLogging;
