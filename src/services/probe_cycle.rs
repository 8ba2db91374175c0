//! Probe cycle service
//!
//! One cycle: plan unique targets, probe them with bounded concurrency,
//! then load, merge and save the stat store on the calling task.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{NodeProbeError, Result};
use crate::models::{normalize_address, EndpointKey, Node};
use crate::probe::{DedupPlanner, ProbeOutcome, Prober, Reachability, TaskScheduler};
use crate::stats::{MergeSummary, RateAnnotator, RatePrecision, RateView, StatsAggregator};
use crate::store::{StatStore, StatTable};
use crate::timing::Stopwatch;

/// Probe cycle configuration
#[derive(Debug, Clone)]
pub struct CycleConfig {
    /// Per-probe timeout in milliseconds
    pub timeout_ms: u64,
    /// Maximum probes in flight
    pub concurrency: usize,
    /// Stat store CSV file
    pub stat_store_path: PathBuf,
    /// Rounding of rates returned by [`ProbeEngine::get_rate`]
    pub precision: RatePrecision,
}

impl CycleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(NodeProbeError::InvalidConfig(
                "probe timeout must be at least 1 ms".into(),
            ));
        }
        if self.concurrency == 0 {
            return Err(NodeProbeError::InvalidConfig(
                "probe concurrency must be at least 1".into(),
            ));
        }
        if self.stat_store_path.as_os_str().is_empty() {
            return Err(NodeProbeError::InvalidConfig(
                "stat store path must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Result of one probe cycle
#[derive(Debug)]
pub struct CycleReport {
    /// Nodes whose address answered, in input order
    pub alive: Vec<Node>,
    /// One outcome per probed address
    pub outcomes: Vec<ProbeOutcome>,
    /// Whether merged statistics reached the store
    pub stats_updated: bool,
    /// Why the store was not updated
    pub stats_error: Option<NodeProbeError>,
}

/// Identity of the store file on disk. Length is compared too because
/// some filesystems keep mtime at one-second resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: SystemTime,
    len: u64,
}

/// Last table seen on disk, with the file's stamp at that point
struct Snapshot {
    table: StatTable,
    stamp: Option<FileStamp>,
}

/// Probing and statistics engine
pub struct ProbeEngine {
    config: CycleConfig,
    prober: Prober,
    scheduler: TaskScheduler,
    store: StatStore,
    snapshot: RwLock<Option<Snapshot>>,
}

impl ProbeEngine {
    /// Create an engine; fails on invalid configuration
    pub fn new(config: CycleConfig, primitive: Arc<dyn Reachability>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            prober: Prober::new(primitive),
            scheduler: TaskScheduler::new(config.concurrency),
            store: StatStore::new(config.stat_store_path.clone()),
            snapshot: RwLock::new(None),
            config,
        })
    }

    pub fn config(&self) -> &CycleConfig {
        &self.config
    }

    pub fn store(&self) -> &StatStore {
        &self.store
    }

    /// Probe every distinct address in `nodes` and fold the results into
    /// the stat store.
    ///
    /// Never fails as a whole: a store that cannot be read, parsed or
    /// written is reported in [`CycleReport::stats_error`] while the alive
    /// nodes are still returned.
    #[instrument(skip(self, nodes), fields(nodes = nodes.len(), primitive = self.prober.primitive_name()))]
    pub async fn run_probe_cycle(&self, nodes: &[Node]) -> CycleReport {
        let stopwatch = Stopwatch::start();
        let plan = DedupPlanner::plan(nodes);

        info!(
            targets = plan.len(),
            concurrency = self.scheduler.limit(),
            timeout_ms = self.config.timeout_ms,
            "Starting probe cycle"
        );

        let timeout_ms = self.config.timeout_ms;
        let tasks = plan.targets().iter().cloned().map(|target| {
            let prober = self.prober.clone();
            move || async move { prober.probe(&target, timeout_ms).await }
        });
        let outcomes = self.scheduler.run_all(tasks).await;

        let alive_addresses: HashSet<String> = outcomes
            .iter()
            .filter(|o| o.alive)
            .map(|o| normalize_address(&o.address))
            .collect();

        let alive: Vec<Node> = nodes
            .iter()
            .filter(|node| {
                node.server_address()
                    .map(|server| alive_addresses.contains(&normalize_address(server)))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        info!(
            probed = outcomes.len(),
            alive_addresses = alive_addresses.len(),
            alive_nodes = alive.len(),
            elapsed = %stopwatch.elapsed_display(),
            "Probing finished"
        );

        let (stats_updated, stats_error) = match self.update_stats(nodes, &alive_addresses) {
            Ok(summary) => {
                info!(
                    passed = summary.passed,
                    failed = summary.failed,
                    skipped = summary.skipped,
                    elapsed = %stopwatch.elapsed_display(),
                    "Statistics updated"
                );
                (true, None)
            }
            Err(e) if e.is_format() => {
                error!(error = %e, "Refusing to merge into unrecognised stat store");
                (false, Some(e))
            }
            Err(e) => {
                error!(error = %e, "Failed to update stat store");
                (false, Some(e))
            }
        };

        CycleReport {
            alive,
            outcomes,
            stats_updated,
            stats_error,
        }
    }

    fn update_stats(&self, nodes: &[Node], alive: &HashSet<String>) -> Result<MergeSummary> {
        let mut table = self.store.load_all()?;
        let summary = StatsAggregator::merge(&mut table, nodes, alive, Utc::now());
        self.store.save_all(&table)?;

        *self.snapshot.write() = Some(Snapshot {
            table,
            stamp: self.store_stamp(),
        });
        Ok(summary)
    }

    /// Success rate for one endpoint, `None` when it has never been observed
    pub fn get_rate(&self, key: &EndpointKey) -> Result<Option<RateView>> {
        self.with_table(|table| RateAnnotator::new(table, self.config.precision).get_rate(key))
    }

    /// Run `f` against the current stat table.
    ///
    /// The cached table is reused while the file on disk is unchanged.
    pub fn with_table<R>(&self, f: impl FnOnce(&StatTable) -> R) -> Result<R> {
        let stamp = self.store_stamp();

        {
            let cached = self.snapshot.read();
            if let Some(snapshot) = cached.as_ref() {
                if stamp.is_some() && snapshot.stamp == stamp {
                    return Ok(f(&snapshot.table));
                }
            }
        }

        debug!(path = %self.store.path().display(), "Reloading stat store");
        let table = self.store.load_all().map_err(|e| {
            warn!(error = %e, "Failed to load stat store");
            e
        })?;
        let result = f(&table);
        *self.snapshot.write() = Some(Snapshot { table, stamp });
        Ok(result)
    }

    fn store_stamp(&self) -> Option<FileStamp> {
        let metadata = fs::metadata(self.store.path()).ok()?;
        Some(FileStamp {
            modified: metadata.modified().ok()?,
            len: metadata.len(),
        })
    }
}
