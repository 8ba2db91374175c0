use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::models::{normalize_address, EndpointStat, Node};
use crate::store::StatTable;

/// Counts from one merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    pub passed: usize,
    pub failed: usize,
    /// Nodes without a server or port
    pub skipped: usize,
}

impl MergeSummary {
    pub fn recorded(&self) -> usize {
        self.passed + self.failed
    }
}

pub struct StatsAggregator;

impl StatsAggregator {
    /// Merge one cycle's results into `table`.
    ///
    /// `alive` holds normalized addresses that answered. Every node with a
    /// server and port contributes one pass or one fail to its endpoint
    /// key, so nodes sharing a key accumulate within the same cycle.
    pub fn merge(
        table: &mut StatTable,
        nodes: &[Node],
        alive: &HashSet<String>,
        now: DateTime<Utc>,
    ) -> MergeSummary {
        let mut summary = MergeSummary::default();

        for node in nodes {
            let Some(key) = node.endpoint_key() else {
                debug!(node = %node.name, "Skipping node without server or port");
                summary.skipped += 1;
                continue;
            };

            let is_alive = node
                .server_address()
                .map(|server| alive.contains(&normalize_address(server)))
                .unwrap_or(false);

            if is_alive {
                summary.passed += 1;
            } else {
                summary.failed += 1;
            }

            table.upsert(
                key,
                &EndpointStat::observation(is_alive, now),
                EndpointStat::merge_increment,
            );
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EndpointKey;
    use chrono::TimeZone;

    fn alive(addresses: &[&str]) -> HashSet<String> {
        addresses.iter().map(|a| normalize_address(a)).collect()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_merge_increments_existing_counters() {
        let key = EndpointKey::new("1.1.1.1", 80, Some("vmess"));
        let mut table = StatTable::new();
        table.insert(
            key.clone(),
            EndpointStat {
                pass: 10,
                fail: 0,
                first_seen: Some(at(1)),
                last_seen: Some(at(1)),
            },
        );
        let nodes = vec![Node::new("a", "1.1.1.1", 80, "vmess")];

        StatsAggregator::merge(&mut table, &nodes, &alive(&[]), at(10));
        StatsAggregator::merge(&mut table, &nodes, &alive(&[]), at(20));

        let stat = table.get(&key).unwrap();
        assert_eq!((stat.pass, stat.fail), (10, 2));
        assert_eq!(stat.first_seen, Some(at(1)));
        assert_eq!(stat.last_seen, Some(at(20)));
    }

    #[test]
    fn test_merge_duplicate_keys_accumulate_within_cycle() {
        let mut table = StatTable::new();
        let nodes = vec![
            Node::new("a", "2.2.2.2", 443, "ss"),
            Node::new("b", "2.2.2.2", 443, "SS"),
        ];

        let summary = StatsAggregator::merge(&mut table, &nodes, &alive(&["2.2.2.2"]), at(5));

        assert_eq!(summary.passed, 2);
        let stat = table.get(&EndpointKey::new("2.2.2.2", 443, Some("ss"))).unwrap();
        assert_eq!(stat.pass, 2);
        assert_eq!(stat.first_seen, Some(at(5)));
    }

    #[test]
    fn test_merge_skips_nodes_without_server_or_port() {
        let mut table = StatTable::new();
        let mut no_port = Node::new("a", "3.3.3.3", 80, "trojan");
        no_port.port = None;
        let mut no_server = Node::new("b", "", 80, "trojan");
        no_server.server = None;

        let summary = StatsAggregator::merge(&mut table, &[no_port, no_server], &alive(&["3.3.3.3"]), at(1));

        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.recorded(), 0);
        assert!(table.is_empty());
    }

    #[test]
    fn test_merge_matches_alive_addresses_case_insensitively() {
        let mut table = StatTable::new();
        let nodes = vec![Node::new("a", "Edge.Example.NET", 443, "trojan")];

        StatsAggregator::merge(&mut table, &nodes, &alive(&["edge.example.net"]), at(1));

        let stat = table
            .get(&EndpointKey::new("edge.example.net", 443, Some("trojan")))
            .unwrap();
        assert_eq!((stat.pass, stat.fail), (1, 0));
    }
}
