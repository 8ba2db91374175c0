//! Success-rate views over the stat table
//!
//! Rates are rounded half away from zero, either to two decimals
//! (66.666.. becomes 66.67) or to an integer (67).

use serde::Serialize;
use tracing::{debug, info};

use crate::models::{EndpointKey, EndpointStat, Node};
use crate::store::StatTable;

/// Node name template used when renaming with success rates
pub const DEFAULT_RENAME_FORMAT: &str = "{rate}|{name}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RatePrecision {
    #[default]
    TwoDecimals,
    Integer,
}

impl RatePrecision {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "two_decimals" | "2" | "decimal" => Some(Self::TwoDecimals),
            "integer" | "0" | "int" => Some(Self::Integer),
            _ => None,
        }
    }

    pub fn round(&self, rate: f64) -> f64 {
        match self {
            RatePrecision::TwoDecimals => (rate * 100.0).round() / 100.0,
            RatePrecision::Integer => rate.round(),
        }
    }
}

/// Read-only counters and rate for one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateView {
    pub pass: u64,
    pub notpass: u64,
    pub rate: f64,
}

impl RateView {
    pub fn from_stat(stat: &EndpointStat, precision: RatePrecision) -> Self {
        RateView {
            pass: stat.pass,
            notpass: stat.fail,
            rate: precision.round(stat.success_rate()),
        }
    }

    pub fn total(&self) -> u64 {
        self.pass.saturating_add(self.notpass)
    }
}

/// Drops endpoints whose rate is below `min_rate` once they have at least
/// `min_count` observations
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateFilter {
    pub min_rate: f64,
    pub min_count: u64,
}

impl Default for RateFilter {
    fn default() -> Self {
        Self {
            min_rate: 30.0,
            min_count: 10,
        }
    }
}

impl RateFilter {
    pub fn excludes(&self, stat: &EndpointStat) -> bool {
        stat.success_rate() < self.min_rate && stat.total() >= self.min_count
    }
}

pub struct RateAnnotator<'a> {
    table: &'a StatTable,
    precision: RatePrecision,
}

impl<'a> RateAnnotator<'a> {
    pub fn new(table: &'a StatTable, precision: RatePrecision) -> Self {
        Self { table, precision }
    }

    pub fn get_rate(&self, key: &EndpointKey) -> Option<RateView> {
        self.table
            .get(key)
            .map(|stat| RateView::from_stat(stat, self.precision))
    }

    pub fn rate_for_node(&self, node: &Node) -> Option<RateView> {
        node.endpoint_key().and_then(|key| self.get_rate(&key))
    }

    /// Keep nodes the filter does not exclude.
    ///
    /// Nodes without a server, port or recorded history are kept.
    pub fn filter_nodes(&self, nodes: Vec<Node>, filter: &RateFilter) -> Vec<Node> {
        let before = nodes.len();
        let kept: Vec<Node> = nodes
            .into_iter()
            .filter(|node| {
                let Some(key) = node.endpoint_key() else {
                    return true;
                };
                match self.table.get(&key) {
                    Some(stat) if filter.excludes(stat) => {
                        debug!(
                            node = %node.name,
                            endpoint = %key,
                            rate = self.precision.round(stat.success_rate()),
                            pass = stat.pass,
                            notpass = stat.fail,
                            "Removing node below success rate threshold"
                        );
                        false
                    }
                    _ => true,
                }
            })
            .collect();

        info!(
            before,
            after = kept.len(),
            min_rate = filter.min_rate,
            min_count = filter.min_count,
            "Filtered nodes by success rate"
        );
        kept
    }

    /// Rewrite names of nodes with history using `format`.
    ///
    /// `{rate}` becomes the integer rate with `%`, `{count}` the number of
    /// observations and `{name}` the original name. Returns how many nodes
    /// were renamed.
    pub fn rename_nodes(&self, nodes: &mut [Node], format: &str) -> usize {
        let mut renamed = 0;
        for node in nodes.iter_mut() {
            let Some(stat) = node.endpoint_key().and_then(|key| self.table.get(&key)) else {
                continue;
            };
            // rounded once from the raw rate, independent of `self.precision`
            let rate = RatePrecision::Integer.round(stat.success_rate()) as u64;
            let name = format
                .replace("{rate}", &format!("{}%", rate))
                .replace("{count}", &stat.total().to_string())
                .replace("{name}", &node.name);
            debug!(from = %node.name, to = %name, "Renamed node");
            node.name = name;
            renamed += 1;
        }
        renamed
    }
}
