// Collector tests: per-environment isolation, failure accounting, re-entrancy, scheduling

mod common;

use common::{FailingStore, NOW, Script, ScriptedFetcher, raw, temp_store};
use nodewatch::collector::{Clock, CollectOutcome, Collector, SchedulerConfig, spawn};
use nodewatch::error::FetchErrorKind;
use nodewatch::models::{Environment, now_ms};
use nodewatch::store::SnapshotStore;
use std::sync::Arc;
use std::time::Duration;

fn at(timestamp: i64) -> Clock {
    Arc::new(move || timestamp)
}

#[tokio::test]
async fn cycle_stores_each_environment_stamped_by_clock() {
    let (_dir, store) = temp_store().await;
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .with(Environment::Beta, Script::Metrics(vec![raw("B1", 10, 10)]))
            .with(
                Environment::Live,
                Script::Metrics(vec![raw("L1", 20, 20), raw("L2", 30, 30)]),
            ),
    );
    let collector =
        Collector::new(fetcher, store.clone(), Environment::ALL.to_vec()).with_clock(at(NOW));

    let reports = collector.run_cycle().await;
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].environment, Environment::Beta);
    assert_eq!(reports[0].outcome, CollectOutcome::Stored { nodes: 1 });
    assert_eq!(reports[1].outcome, CollectOutcome::Stored { nodes: 2 });

    let live = store
        .query_range(None, Environment::Live, 0, i64::MAX)
        .await
        .unwrap();
    assert_eq!(live.len(), 2);
    assert!(live.iter().all(|s| s.timestamp == NOW));
    let beta = store
        .query_range(None, Environment::Beta, 0, i64::MAX)
        .await
        .unwrap();
    assert_eq!(beta.len(), 1);
    assert_eq!(beta[0].node_id, "B1");

    let stats = collector.stats();
    assert_eq!(stats.cycles_total, 1);
    assert_eq!(stats.snapshots_saved_total, 3);
    assert_eq!(stats.fetch_failures_total, 0);
}

#[tokio::test]
async fn live_auth_failure_does_not_block_beta() {
    let (_dir, store) = temp_store().await;
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .with(Environment::Beta, Script::Metrics(vec![raw("B1", 10, 10)]))
            .with(Environment::Live, Script::MissingCredentials),
    );
    let collector =
        Collector::new(fetcher, store.clone(), Environment::ALL.to_vec()).with_clock(at(NOW));

    let reports = collector.run_cycle().await;
    assert_eq!(reports[0].outcome, CollectOutcome::Stored { nodes: 1 });
    assert_eq!(
        reports[1].outcome,
        CollectOutcome::FetchFailed {
            kind: FetchErrorKind::Auth
        }
    );

    let live = store
        .query_range(None, Environment::Live, 0, i64::MAX)
        .await
        .unwrap();
    assert!(live.is_empty());
    assert_eq!(collector.stats().fetch_failures_total, 1);
}

#[tokio::test]
async fn transport_and_malformed_failures_are_classified() {
    let (_dir, store) = temp_store().await;
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .with(Environment::Beta, Script::Unavailable)
            .with(Environment::Live, Script::Malformed),
    );
    let collector =
        Collector::new(fetcher, store, Environment::ALL.to_vec()).with_clock(at(NOW));

    let reports = collector.run_cycle().await;
    assert_eq!(
        reports[0].outcome,
        CollectOutcome::FetchFailed {
            kind: FetchErrorKind::Transport
        }
    );
    assert_eq!(
        reports[1].outcome,
        CollectOutcome::FetchFailed {
            kind: FetchErrorKind::Malformed
        }
    );
    assert_eq!(collector.stats().fetch_failures_total, 2);
}

#[tokio::test]
async fn persist_failure_is_reported_not_propagated() {
    let fetcher = Arc::new(
        ScriptedFetcher::new().with(Environment::Live, Script::Metrics(vec![raw("L1", 1, 1)])),
    );
    let collector = Collector::new(fetcher, Arc::new(FailingStore), vec![Environment::Live]);

    let reports = collector.run_cycle().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].outcome, CollectOutcome::PersistFailed);
    let stats = collector.stats();
    assert_eq!(stats.persist_failures_total, 1);
    assert_eq!(stats.snapshots_saved_total, 0);
}

#[tokio::test]
async fn empty_batch_is_a_successful_cycle() {
    let (_dir, store) = temp_store().await;
    let fetcher = Arc::new(ScriptedFetcher::new().with(Environment::Beta, Script::Metrics(vec![])));
    let collector = Collector::new(fetcher, store, vec![Environment::Beta]);

    let reports = collector.run_cycle().await;
    assert_eq!(reports[0].outcome, CollectOutcome::Stored { nodes: 0 });
}

#[tokio::test]
async fn metrics_without_node_id_are_not_stored() {
    let (_dir, store) = temp_store().await;
    let fetcher = Arc::new(ScriptedFetcher::new().with(
        Environment::Live,
        Script::Metrics(vec![raw("", 5, 5), raw("L1", 6, 6)]),
    ));
    let collector = Collector::new(fetcher, store.clone(), vec![Environment::Live]);

    let reports = collector.run_cycle().await;
    assert_eq!(reports[0].outcome, CollectOutcome::Stored { nodes: 1 });
    let live = store
        .query_range(None, Environment::Live, 0, i64::MAX)
        .await
        .unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].node_id, "L1");
}

#[tokio::test]
async fn overlapping_cycle_for_same_environment_is_skipped() {
    let (_dir, store) = temp_store().await;
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .with_delay(Duration::from_millis(300))
            .with(Environment::Live, Script::Metrics(vec![raw("L1", 1, 1)])),
    );
    let collector = Arc::new(Collector::new(
        fetcher.clone(),
        store.clone(),
        vec![Environment::Live],
    ));

    let first = {
        let collector = collector.clone();
        tokio::spawn(async move { collector.run_cycle().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = collector.run_cycle().await;
    let first = first.await.unwrap();

    assert_eq!(second[0].outcome, CollectOutcome::Skipped);
    assert_eq!(first[0].outcome, CollectOutcome::Stored { nodes: 1 });
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(collector.stats().skipped_total, 1);

    // Flag is released once the first run finishes.
    let third = collector.run_cycle().await;
    assert_eq!(third[0].outcome, CollectOutcome::Stored { nodes: 1 });
}

#[tokio::test]
async fn spawned_collector_runs_immediately_and_stops() {
    let (_dir, store) = temp_store().await;
    let fetcher = Arc::new(
        ScriptedFetcher::new().with(Environment::Live, Script::Metrics(vec![raw("L1", 1, 1)])),
    );
    let collector = Arc::new(Collector::new(
        fetcher.clone(),
        store.clone(),
        vec![Environment::Live],
    ));

    let handle = spawn(
        collector.clone(),
        SchedulerConfig {
            interval_minutes: 30,
            stats_log_interval_secs: 3600,
        },
    );

    let mut waited = 0;
    while collector.stats().cycles_total == 0 && waited < 50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        waited += 1;
    }
    assert_eq!(collector.stats().cycles_total, 1);
    assert!(!handle.is_finished());

    tokio::time::timeout(Duration::from_secs(5), handle.stop())
        .await
        .expect("collector stops promptly");

    let live = store
        .query_range(None, Environment::Live, 0, i64::MAX)
        .await
        .unwrap();
    assert_eq!(live.len(), 1);
}

#[tokio::test]
async fn snapshots_are_stamped_when_slow_fetch_completes() {
    let (_dir, store) = temp_store().await;
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .with_delay(Duration::from_millis(300))
            .with(Environment::Live, Script::Metrics(vec![raw("L1", 1, 1)])),
    );
    let collector = Collector::new(fetcher, store.clone(), vec![Environment::Live]);

    let started = now_ms();
    let reports = collector.run_cycle().await;
    let finished = now_ms();
    assert_eq!(reports[0].outcome, CollectOutcome::Stored { nodes: 1 });

    let live = store
        .query_range(None, Environment::Live, 0, i64::MAX)
        .await
        .unwrap();
    let stamped = live[0].timestamp;
    assert!(
        stamped >= started + 300,
        "stamped {} is before the fetch finished (started {})",
        stamped,
        started
    );
    assert!(stamped <= finished);
}
