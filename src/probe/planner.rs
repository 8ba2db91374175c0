use std::collections::HashMap;

use super::ProbeTarget;
use crate::models::{normalize_address, Node};

/// Unique probe targets for a node list.
///
/// Reachability is a host-level property, so targets are keyed by address
/// alone; statistics later fan back out to every node on that address.
#[derive(Debug, Clone, Default)]
pub struct ProbePlan {
    targets: Vec<ProbeTarget>,
    first_node: HashMap<String, usize>,
}

impl ProbePlan {
    /// Targets in order of first appearance
    pub fn targets(&self) -> &[ProbeTarget] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Index (into the planned node list) of the first node using `address`
    pub fn first_node_index(&self, address: &str) -> Option<usize> {
        self.first_node.get(&normalize_address(address)).copied()
    }

    /// First node using `address`
    pub fn node_for<'a>(&self, nodes: &'a [Node], address: &str) -> Option<&'a Node> {
        self.first_node_index(address).and_then(|i| nodes.get(i))
    }
}

pub struct DedupPlanner;

impl DedupPlanner {
    /// Collapse `nodes` into one target per distinct non-empty server
    pub fn plan(nodes: &[Node]) -> ProbePlan {
        let mut plan = ProbePlan::default();

        for (index, node) in nodes.iter().enumerate() {
            let Some(server) = node.server_address() else {
                continue;
            };
            let normalized = normalize_address(server);
            if plan.first_node.contains_key(&normalized) {
                continue;
            }
            plan.first_node.insert(normalized, index);
            plan.targets
                .push(ProbeTarget::new(server, node.usable_port()));
        }

        plan
    }
}
