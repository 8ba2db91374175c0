//! Merging probe outcomes into the stat table and reading success rates back out

mod aggregator;
mod rate;

pub use aggregator::{MergeSummary, StatsAggregator};
pub use rate::{RateAnnotator, RateFilter, RatePrecision, RateView, DEFAULT_RENAME_FORMAT};
