//! Durable endpoint statistics
//!
//! [`StatTable`] is the in-memory batch a probe cycle merges into;
//! [`StatStore`] loads and atomically saves it as delimited text.

mod csv_store;
mod table;

pub use csv_store::{StatStore, StoreSchema};
pub use table::StatTable;
