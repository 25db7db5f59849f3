// Background collector: every interval, fetch each configured environment and
// append the snapshots. No aggregation happens here.
// Environments run concurrently and fail independently. A per-environment
// running flag keeps two cycles from writing the same environment at once.

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::oneshot;
use tokio::time::{Duration, interval};
use tracing::Instrument;

use crate::error::FetchErrorKind;
use crate::models::{Environment, NodeSnapshot, now_ms};
use crate::store::SnapshotStore;
use crate::telemetry::TelemetrySource;

/// What happened to one environment in one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CollectOutcome {
    Stored { nodes: usize },
    /// A previous cycle for this environment was still running.
    Skipped,
    FetchFailed { kind: FetchErrorKind },
    PersistFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub environment: Environment,
    pub outcome: CollectOutcome,
}

/// Running totals since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorStats {
    pub cycles_total: u64,
    pub snapshots_saved_total: u64,
    pub fetch_failures_total: u64,
    pub persist_failures_total: u64,
    pub skipped_total: u64,
}

#[derive(Default)]
struct Counters {
    cycles_total: AtomicU64,
    snapshots_saved_total: AtomicU64,
    fetch_failures_total: AtomicU64,
    persist_failures_total: AtomicU64,
    skipped_total: AtomicU64,
}

/// Clears the environment's running flag on drop.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Source of collection timestamps (Unix ms).
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

pub struct Collector {
    fetcher: Arc<dyn TelemetrySource>,
    store: Arc<dyn SnapshotStore>,
    environments: Vec<Environment>,
    beta_running: AtomicBool,
    live_running: AtomicBool,
    counters: Counters,
    clock: Clock,
}

impl Collector {
    pub fn new(
        fetcher: Arc<dyn TelemetrySource>,
        store: Arc<dyn SnapshotStore>,
        environments: Vec<Environment>,
    ) -> Self {
        Self {
            fetcher,
            store,
            environments,
            beta_running: AtomicBool::new(false),
            live_running: AtomicBool::new(false),
            counters: Counters::default(),
            clock: Arc::new(now_ms),
        }
    }

    /// Replace the wall clock used to stamp snapshots.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn environments(&self) -> &[Environment] {
        &self.environments
    }

    fn running_flag(&self, environment: Environment) -> &AtomicBool {
        match environment {
            Environment::Beta => &self.beta_running,
            Environment::Live => &self.live_running,
        }
    }

    /// One fetch-and-store pass over every configured environment.
    pub async fn run_cycle(&self) -> Vec<CycleReport> {
        let runs = self
            .environments
            .iter()
            .map(|&environment| self.collect_environment(environment));
        let reports = join_all(runs).await;
        self.counters.cycles_total.fetch_add(1, Ordering::Relaxed);
        reports
    }

    /// Fetch one environment and append its snapshots, stamped when the fetch completed.
    /// Failures are logged and reported, never propagated.
    pub async fn collect_environment(&self, environment: Environment) -> CycleReport {
        let outcome = match RunGuard::acquire(self.running_flag(environment)) {
            Some(_guard) => self.fetch_and_store(environment).await,
            None => {
                tracing::warn!(
                    %environment,
                    operation = "collect",
                    "previous collection still running; skipping"
                );
                self.counters.skipped_total.fetch_add(1, Ordering::Relaxed);
                CollectOutcome::Skipped
            }
        };
        CycleReport {
            environment,
            outcome,
        }
    }

    async fn fetch_and_store(&self, environment: Environment) -> CollectOutcome {
        let metrics = match self.fetcher.fetch(environment).await {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(
                    %environment,
                    error = %e,
                    kind = e.kind().as_str(),
                    operation = "fetch_telemetry",
                    "telemetry fetch failed"
                );
                self.counters
                    .fetch_failures_total
                    .fetch_add(1, Ordering::Relaxed);
                return CollectOutcome::FetchFailed { kind: e.kind() };
            }
        };

        let now = (self.clock)();
        let snapshots: Vec<NodeSnapshot> = metrics
            .iter()
            .filter(|m| !m.node_id.is_empty())
            .map(|m| NodeSnapshot::from_raw(environment, m, now))
            .collect();
        let dropped = metrics.len() - snapshots.len();
        if dropped > 0 {
            tracing::debug!(%environment, dropped, "skipping metrics without node_id");
        }

        if let Err(e) = self.store.append_batch(&snapshots).await {
            tracing::warn!(
                %environment,
                error = %e,
                operation = "append_batch",
                "failed to persist snapshots"
            );
            self.counters
                .persist_failures_total
                .fetch_add(1, Ordering::Relaxed);
            return CollectOutcome::PersistFailed;
        }

        let nodes = snapshots.len();
        self.counters
            .snapshots_saved_total
            .fetch_add(nodes as u64, Ordering::Relaxed);
        tracing::info!(%environment, nodes, "snapshots stored");
        CollectOutcome::Stored { nodes }
    }

    pub fn stats(&self) -> CollectorStats {
        CollectorStats {
            cycles_total: self.counters.cycles_total.load(Ordering::Relaxed),
            snapshots_saved_total: self.counters.snapshots_saved_total.load(Ordering::Relaxed),
            fetch_failures_total: self.counters.fetch_failures_total.load(Ordering::Relaxed),
            persist_failures_total: self.counters.persist_failures_total.load(Ordering::Relaxed),
            skipped_total: self.counters.skipped_total.load(Ordering::Relaxed),
        }
    }
}

/// Timer settings for the collector task.
pub struct SchedulerConfig {
    pub interval_minutes: u64,
    /// How often to log collector totals (real seconds).
    pub stats_log_interval_secs: u64,
}

/// Owns the running collector task. Dropping the handle also ends the loop.
pub struct CollectorHandle {
    shutdown_tx: oneshot::Sender<()>,
    join: tokio::task::JoinHandle<()>,
}

impl CollectorHandle {
    /// Signal shutdown and wait for the task. A cycle already in progress completes first.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.join.await {
            tracing::warn!(error = %e, "collector task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Spawns the collector loop. The first cycle runs immediately.
pub fn spawn(collector: Arc<Collector>, config: SchedulerConfig) -> CollectorHandle {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
    let SchedulerConfig {
        interval_minutes,
        stats_log_interval_secs,
    } = config;

    let collector_span = tracing::span!(tracing::Level::DEBUG, "collector", interval_minutes);
    let run = async move {
        let mut tick = interval(Duration::from_secs(interval_minutes.saturating_mul(60)));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut stats_log_tick = interval(Duration::from_secs(stats_log_interval_secs));
        stats_log_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    collector.run_cycle().await;
                }
                _ = stats_log_tick.tick() => {
                    let stats = collector.stats();
                    tracing::info!(
                        cycles_total = stats.cycles_total,
                        snapshots_saved_total = stats.snapshots_saved_total,
                        fetch_failures_total = stats.fetch_failures_total,
                        persist_failures_total = stats.persist_failures_total,
                        skipped_total = stats.skipped_total,
                        "collector stats"
                    );
                }
                _ = &mut shutdown_rx => {
                    tracing::debug!("Collector shutting down");
                    break;
                }
            }
        }
    };
    let join = tokio::spawn(run.instrument(collector_span));

    CollectorHandle { shutdown_tx, join }
}
