// On-demand enrichment tests: fetch + stored history -> report

mod common;

use common::{DAY, HOUR, NOW, Script, ScriptedFetcher, raw, snapshot, temp_store};
use nodewatch::aggregator::AggregationSettings;
use nodewatch::error::{FetchError, ServiceError};
use nodewatch::models::Environment;
use nodewatch::service::{MetricsService, enrich_batch};
use nodewatch::store::SnapshotStore;
use std::sync::Arc;

#[tokio::test]
async fn empty_beta_batch_has_zero_maxima() {
    let (_dir, store) = temp_store().await;
    let fetcher = Arc::new(ScriptedFetcher::new().with(Environment::Beta, Script::Metrics(vec![])));
    let service = MetricsService::new(fetcher, store, AggregationSettings::default());

    let report = service.enrich_at(Environment::Beta, NOW).await.unwrap();
    assert_eq!(report.environment, Environment::Beta);
    assert!(report.metrics.is_empty());
    assert_eq!(report.max_block_count, 0);
    assert_eq!(report.max_cemented_count, 0);
}

#[tokio::test]
async fn nodes_without_history_have_no_rates() {
    let (_dir, store) = temp_store().await;
    let fetcher = Arc::new(ScriptedFetcher::new().with(
        Environment::Live,
        Script::Metrics(vec![raw("A", 1000, 990), raw("B", 800, 100)]),
    ));
    let service = MetricsService::new(fetcher, store, AggregationSettings::default());

    let report = service.enrich_at(Environment::Live, NOW).await.unwrap();
    assert_eq!(report.metrics.len(), 2);
    assert_eq!(report.max_block_count, 1000);
    assert_eq!(report.max_cemented_count, 990);
    for m in &report.metrics {
        assert_eq!(m.hourly_blocks, None);
        assert_eq!(m.daily_blocks, None);
        assert_eq!(m.timestamp, NOW);
    }
    assert!(!report.metrics[0].bootstrapping);
    assert!(report.metrics[1].bootstrapping);
}

#[tokio::test]
async fn enrich_uses_stored_hour_and_day_references() {
    let (_dir, store) = temp_store().await;
    store
        .append_batch(&[
            snapshot(Environment::Live, "A", 1000, 1000, NOW - DAY),
            snapshot(Environment::Live, "A", 3300, 3350, NOW - HOUR),
        ])
        .await
        .unwrap();
    let fetcher = Arc::new(ScriptedFetcher::new().with(
        Environment::Live,
        Script::Metrics(vec![raw("A", 3400, 3400)]),
    ));
    let service = MetricsService::new(fetcher, store, AggregationSettings::default());

    let report = service.enrich_at(Environment::Live, NOW).await.unwrap();
    let m = &report.metrics[0];
    assert_eq!(m.hourly_blocks, Some(100.0));
    assert_eq!(m.hourly_cemented, Some(50.0));
    assert_eq!(m.daily_blocks, Some(2400.0));
    assert_eq!(m.daily_cemented, Some(2400.0));
    assert_eq!(m.block_percent, Some(100.0));
}

#[tokio::test]
async fn history_is_isolated_per_environment() {
    let (_dir, store) = temp_store().await;
    store
        .append(&snapshot(Environment::Beta, "A", 0, 0, NOW - HOUR))
        .await
        .unwrap();
    let fetcher = Arc::new(
        ScriptedFetcher::new().with(Environment::Live, Script::Metrics(vec![raw("A", 50, 50)])),
    );
    let service = MetricsService::new(fetcher, store, AggregationSettings::default());

    let report = service.enrich_at(Environment::Live, NOW).await.unwrap();
    assert_eq!(report.metrics[0].hourly_blocks, None);
}

#[tokio::test]
async fn enrichment_does_not_write_history() {
    let (_dir, store) = temp_store().await;
    store
        .append(&snapshot(Environment::Live, "A", 900, 900, NOW - HOUR))
        .await
        .unwrap();
    let fetcher = Arc::new(
        ScriptedFetcher::new().with(Environment::Live, Script::Metrics(vec![raw("A", 1000, 1000)])),
    );
    let service = MetricsService::new(fetcher, store.clone(), AggregationSettings::default());

    let first = service.enrich_at(Environment::Live, NOW).await.unwrap();
    let second = service.enrich_at(Environment::Live, NOW).await.unwrap();
    assert_eq!(first, second);

    let stored = store
        .query_range(None, Environment::Live, 0, i64::MAX)
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn fetch_failure_surfaces_as_service_error() {
    let (_dir, store) = temp_store().await;
    let fetcher =
        Arc::new(ScriptedFetcher::new().with(Environment::Beta, Script::MissingCredentials));
    let service = MetricsService::new(fetcher, store, AggregationSettings::default());

    let err = service.enrich_at(Environment::Beta, NOW).await.unwrap_err();
    assert!(matches!(err, ServiceError::Fetch(FetchError::Auth(_))));
}

#[tokio::test]
async fn nodes_without_id_count_towards_maxima_only() {
    let (_dir, store) = temp_store().await;
    let batch = vec![raw("", 5000, 5000), raw("A", 2500, 2500)];
    let report = enrich_batch(
        store.as_ref(),
        Environment::Live,
        &batch,
        NOW,
        &AggregationSettings::default(),
    )
    .await
    .unwrap();
    assert_eq!(report.metrics.len(), 1);
    assert_eq!(report.max_block_count, 5000);
    assert_eq!(report.metrics[0].block_percent, Some(50.0));
    assert!(report.metrics[0].bootstrapping);
}

#[tokio::test]
async fn bootstrapping_threshold_is_configurable() {
    let (_dir, store) = temp_store().await;
    let batch = vec![raw("A", 1000, 1000), raw("B", 1000, 500)];
    let settings = AggregationSettings {
        bootstrapping_threshold_percent: 40.0,
        ..AggregationSettings::default()
    };
    let report = enrich_batch(store.as_ref(), Environment::Live, &batch, NOW, &settings)
        .await
        .unwrap();
    assert!(!report.metrics[1].bootstrapping);
}

#[tokio::test]
async fn node_history_returns_ascending_points() {
    let (_dir, store) = temp_store().await;
    store
        .append_batch(&[
            snapshot(Environment::Live, "A", 2, 2, NOW - HOUR),
            snapshot(Environment::Live, "A", 1, 1, NOW - 2 * HOUR),
            snapshot(Environment::Live, "B", 9, 9, NOW - HOUR),
        ])
        .await
        .unwrap();
    let service = MetricsService::new(
        Arc::new(ScriptedFetcher::new()),
        store,
        AggregationSettings::default(),
    );

    let points = service
        .node_history(Environment::Live, "A", NOW - DAY, NOW)
        .await
        .unwrap();
    let counts: Vec<u64> = points.iter().map(|p| p.block_count).collect();
    assert_eq!(counts, vec![1, 2]);
    assert_eq!(points[0].version, "26.1.0");
}
