// On-demand path: fetch live telemetry, enrich against stored history, return.
// Read-only with respect to the store; history comes from collector cycles.

use std::sync::Arc;
use tracing::instrument;

use crate::aggregator::{
    AggregationSettings, apply_batch_shares, enrich, maxima, resolve_references,
};
use crate::error::{PersistenceError, ServiceError};
use crate::models::{Environment, HistoryPoint, MetricsReport, RawMetric, now_ms};
use crate::store::SnapshotStore;
use crate::telemetry::TelemetrySource;

pub struct MetricsService {
    fetcher: Arc<dyn TelemetrySource>,
    store: Arc<dyn SnapshotStore>,
    settings: AggregationSettings,
}

impl MetricsService {
    pub fn new(
        fetcher: Arc<dyn TelemetrySource>,
        store: Arc<dyn SnapshotStore>,
        settings: AggregationSettings,
    ) -> Self {
        Self {
            fetcher,
            store,
            settings,
        }
    }

    /// Fetch `environment` now and enrich every reporting node.
    pub async fn enrich_now(&self, environment: Environment) -> Result<MetricsReport, ServiceError> {
        self.enrich_at(environment, now_ms()).await
    }

    #[instrument(skip(self), fields(operation = "enrich"))]
    pub async fn enrich_at(
        &self,
        environment: Environment,
        now: i64,
    ) -> Result<MetricsReport, ServiceError> {
        let fresh = self.fetcher.fetch(environment).await?;
        let report =
            enrich_batch(self.store.as_ref(), environment, &fresh, now, &self.settings).await?;
        tracing::debug!(
            %environment,
            nodes = report.metrics.len(),
            max_block_count = report.max_block_count,
            "metrics enriched"
        );
        Ok(report)
    }

    /// Chart history for one node over `[from, to)`.
    pub async fn node_history(
        &self,
        environment: Environment,
        node_id: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<HistoryPoint>, PersistenceError> {
        let snapshots = self
            .store
            .query_range(Some(node_id), environment, from, to)
            .await?;
        Ok(snapshots.iter().map(HistoryPoint::from).collect())
    }
}

/// Enrich a fetched batch. Nodes with an empty `node_id` are left out of the
/// result but still count towards the maxima.
pub async fn enrich_batch(
    store: &dyn SnapshotStore,
    environment: Environment,
    fresh: &[RawMetric],
    now: i64,
    settings: &AggregationSettings,
) -> Result<MetricsReport, PersistenceError> {
    let (max_block_count, max_cemented_count) = maxima(fresh);

    let mut metrics = Vec::with_capacity(fresh.len());
    for metric in fresh.iter().filter(|m| !m.node_id.is_empty()) {
        let refs = resolve_references(
            store,
            environment,
            &metric.node_id,
            now,
            settings.lookback_slack_ms,
        )
        .await?;
        metrics.push(enrich(
            environment,
            metric,
            refs.hour.as_ref(),
            refs.day.as_ref(),
            now,
        ));
    }
    apply_batch_shares(
        &mut metrics,
        max_block_count,
        max_cemented_count,
        settings.bootstrapping_threshold_percent,
    );

    Ok(MetricsReport {
        environment,
        metrics,
        max_block_count,
        max_cemented_count,
    })
}
