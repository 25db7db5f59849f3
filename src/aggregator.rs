// Rate aggregation: fresh metric + reference snapshots -> hourly/daily growth rates.
// Pure except for `resolve_references`, which reads the store.

use crate::error::PersistenceError;
use crate::models::{
    EnrichedMetric, Environment, MS_PER_DAY, MS_PER_HOUR, NodeSnapshot, RawMetric,
};
use crate::store::SnapshotStore;

/// A reference window: how far back the baseline sits and what period the rate is expressed in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub target_ms: i64,
    /// Multiplier applied to the per-hour rate.
    pub scale: f64,
}

pub const HOUR_WINDOW: Window = Window {
    target_ms: MS_PER_HOUR,
    scale: 1.0,
};

pub const DAY_WINDOW: Window = Window {
    target_ms: MS_PER_DAY,
    scale: 24.0,
};

/// Rates for one window. `None` = no reference, non-positive elapsed time, or counter regression.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowRates {
    pub blocks: Option<f64>,
    pub cemented: Option<f64>,
}

/// Reference snapshots for one node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct References {
    pub hour: Option<NodeSnapshot>,
    pub day: Option<NodeSnapshot>,
}

/// Tunables for enrichment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregationSettings {
    pub lookback_slack_ms: i64,
    pub bootstrapping_threshold_percent: f64,
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self {
            lookback_slack_ms: 30 * 60 * 1000,
            bootstrapping_threshold_percent: 95.0,
        }
    }
}

/// Rates of `fresh` against `reference` for the given window scale.
pub fn window_rates(
    fresh: &RawMetric,
    reference: Option<&NodeSnapshot>,
    window: Window,
    now: i64,
) -> WindowRates {
    let Some(reference) = reference else {
        return WindowRates::default();
    };
    let elapsed_hours = (now - reference.timestamp) as f64 / MS_PER_HOUR as f64;
    if elapsed_hours <= 0.0 || !elapsed_hours.is_finite() {
        return WindowRates::default();
    }
    WindowRates {
        blocks: rate(
            fresh.block_count,
            reference.block_count,
            elapsed_hours,
            window.scale,
        ),
        cemented: rate(
            fresh.cemented_count,
            reference.cemented_count,
            elapsed_hours,
            window.scale,
        ),
    }
}

// A counter that went backwards (restart / resync) has no defined rate.
fn rate(current: u64, reference: u64, elapsed_hours: f64, scale: f64) -> Option<f64> {
    if current < reference {
        return None;
    }
    Some((current - reference) as f64 / elapsed_hours * scale)
}

/// Build the enriched record for one fresh metric. Missing history is not an error:
/// the affected fields are simply absent.
pub fn enrich(
    environment: Environment,
    fresh: &RawMetric,
    hour_ref: Option<&NodeSnapshot>,
    day_ref: Option<&NodeSnapshot>,
    now: i64,
) -> EnrichedMetric {
    let hourly = window_rates(fresh, hour_ref, HOUR_WINDOW, now);
    let daily = window_rates(fresh, day_ref, DAY_WINDOW, now);
    EnrichedMetric {
        environment,
        node_id: fresh.node_id.clone(),
        address: fresh.address.clone(),
        block_count: fresh.block_count,
        cemented_count: fresh.cemented_count,
        major_version: fresh.major_version.clone(),
        minor_version: fresh.minor_version.clone(),
        patch_version: fresh.patch_version.clone(),
        pre_release_version: fresh.pre_release_version.clone(),
        version: fresh.version(),
        timestamp: now,
        hourly_blocks: hourly.blocks,
        hourly_cemented: hourly.cemented,
        daily_blocks: daily.blocks,
        daily_cemented: daily.cemented,
        block_percent: None,
        cemented_percent: None,
        bootstrapping: false,
    }
}

/// Fill the batch-relative fields: share of the batch maximum and bootstrapping flag.
pub fn apply_batch_shares(
    metrics: &mut [EnrichedMetric],
    max_block_count: u64,
    max_cemented_count: u64,
    bootstrapping_threshold_percent: f64,
) {
    for m in metrics.iter_mut() {
        m.block_percent = percent_of(m.block_count, max_block_count);
        m.cemented_percent = percent_of(m.cemented_count, max_cemented_count);
        m.bootstrapping = m
            .cemented_percent
            .is_some_and(|p| p < bootstrapping_threshold_percent);
    }
}

fn percent_of(value: u64, max: u64) -> Option<f64> {
    if max == 0 {
        None
    } else {
        Some(value as f64 / max as f64 * 100.0)
    }
}

/// Maximum block and cemented counts across a batch; `(0, 0)` when empty.
pub fn maxima(metrics: &[RawMetric]) -> (u64, u64) {
    metrics.iter().fold((0, 0), |(blocks, cemented), m| {
        (blocks.max(m.block_count), cemented.max(m.cemented_count))
    })
}

/// Look up the hour and day references for `node_id`, honouring the lookback slack.
pub async fn resolve_references(
    store: &dyn SnapshotStore,
    environment: Environment,
    node_id: &str,
    now: i64,
    lookback_slack_ms: i64,
) -> Result<References, PersistenceError> {
    let hour = store
        .query_latest_before(
            node_id,
            environment,
            now - HOUR_WINDOW.target_ms,
            lookback_slack_ms,
        )
        .await?;
    let day = store
        .query_latest_before(
            node_id,
            environment,
            now - DAY_WINDOW.target_ms,
            lookback_slack_ms,
        )
        .await?;
    Ok(References { hour, day })
}
