// Operator retention policy: prune snapshots older than retention_days, VACUUM afterwards.
// Only spawned when database.retention_days is set. The collector and the
// on-demand path never delete anything.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::models::{MS_PER_DAY, now_ms};
use crate::store::SnapshotStore;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone)]
pub struct MaintenanceWorkerConfig {
    pub retention_days: u32,
    pub prune_interval_secs: u64,
    /// Cron expression for VACUUM in local time, e.g. "0 0 3 * * *".
    pub vacuum_schedule: Option<String>,
    pub vacuum_interval_secs: u64,
}

/// When VACUUM runs. An unparsable cron expression disables it.
#[derive(Debug, Clone)]
pub enum VacuumSchedule {
    Cron(Box<cron::Schedule>),
    Every(Duration),
    Disabled,
}

impl VacuumSchedule {
    pub fn from_config(config: &MaintenanceWorkerConfig) -> Self {
        match config.vacuum_schedule.as_deref() {
            Some(expr) => match cron::Schedule::from_str(expr) {
                Ok(schedule) => VacuumSchedule::Cron(Box::new(schedule)),
                Err(e) => {
                    warn!(cron = %expr, error = %e, "invalid vacuum_schedule; VACUUM disabled");
                    VacuumSchedule::Disabled
                }
            },
            None => VacuumSchedule::Every(Duration::from_secs(config.vacuum_interval_secs)),
        }
    }

    /// Time until the next VACUUM, or `None` when there is none.
    pub fn next_delay(&self) -> Option<Duration> {
        match self {
            VacuumSchedule::Cron(schedule) => {
                let now = chrono::Local::now();
                let next = schedule.after(&now).next()?;
                Some((next - now).to_std().unwrap_or(Duration::from_secs(1)))
            }
            VacuumSchedule::Every(interval) => Some(*interval),
            VacuumSchedule::Disabled => None,
        }
    }
}

pub fn spawn(
    store: Arc<dyn SnapshotStore>,
    config: MaintenanceWorkerConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run(store, config))
}

#[instrument(skip(store), fields(retention_days = config.retention_days))]
async fn run(store: Arc<dyn SnapshotStore>, config: MaintenanceWorkerConfig) {
    let vacuum = VacuumSchedule::from_config(&config);
    let mut prune_tick = tokio::time::interval(Duration::from_secs(config.prune_interval_secs));
    prune_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let next_vacuum = || vacuum.next_delay().map(|d| tokio::time::Instant::now() + d);
    let mut vacuum_at = next_vacuum();

    loop {
        let vacuum_due = async move {
            match vacuum_at {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = prune_tick.tick() => {
                match prune_once(store.as_ref(), config.retention_days, now_ms()).await {
                    Ok(0) => {}
                    Ok(deleted) => info!(deleted, "old snapshots pruned"),
                    Err(e) => warn!(error = %e, operation = "prune_before", "prune failed"),
                }
            }
            _ = vacuum_due => {
                match store.vacuum().await {
                    Ok(()) => info!("vacuum complete"),
                    Err(e) => warn!(error = %e, operation = "vacuum", "vacuum failed"),
                }
                vacuum_at = next_vacuum();
            }
        }
    }
}

/// Delete snapshots older than `retention_days` before `now`. Returns rows deleted.
pub async fn prune_once(
    store: &dyn SnapshotStore,
    retention_days: u32,
    now: i64,
) -> anyhow::Result<u64> {
    let cutoff = now - (retention_days as i64) * MS_PER_DAY;
    Ok(store.prune_before(cutoff).await?)
}
