//! Post-probe node list stage: rate filter, then rate-prefixed renaming

use tracing::info;

use crate::config::PipelineConfig;
use crate::models::Node;
use crate::stats::{RateAnnotator, RateFilter, RatePrecision};
use crate::store::StatTable;

#[derive(Debug, Clone, Default)]
pub struct NodePipeline {
    filter: Option<RateFilter>,
    rename_format: Option<String>,
}

impl NodePipeline {
    pub fn new(filter: Option<RateFilter>, rename_format: Option<String>) -> Self {
        Self {
            filter,
            rename_format,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.filter_enabled.then_some(config.filter),
            config
                .rename_enabled
                .then(|| config.rename_format.clone()),
        )
    }

    /// True when no stage is enabled
    pub fn is_noop(&self) -> bool {
        self.filter.is_none() && self.rename_format.is_none()
    }

    pub fn apply(&self, nodes: Vec<Node>, table: &StatTable) -> Vec<Node> {
        let annotator = RateAnnotator::new(table, RatePrecision::default());

        let mut nodes = match &self.filter {
            Some(filter) => annotator.filter_nodes(nodes, filter),
            None => nodes,
        };

        if let Some(format) = &self.rename_format {
            let renamed = annotator.rename_nodes(&mut nodes, format);
            info!(renamed, total = nodes.len(), "Renamed nodes with success rate");
        }

        nodes
    }
}
