// Shared test helpers: scripted telemetry source, failing store, temp SQLite store

#![allow(dead_code)]

use async_trait::async_trait;
use nodewatch::error::{ConfigError, FetchError, PersistenceError};
use nodewatch::models::{Environment, NodeSnapshot, RawMetric};
use nodewatch::store::{SnapshotStore, SqliteSnapshotStore};
use nodewatch::telemetry::TelemetrySource;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

pub const HOUR: i64 = 60 * 60 * 1000;
pub const DAY: i64 = 24 * HOUR;
/// Fixed "now" for deterministic rate tests (2026-01-01T00:00:00Z).
pub const NOW: i64 = 1_767_225_600_000;

pub fn raw(node_id: &str, block_count: u64, cemented_count: u64) -> RawMetric {
    RawMetric {
        block_count,
        cemented_count,
        address: "::ffff:10.0.0.1:7075".into(),
        node_id: node_id.into(),
        major_version: "26".into(),
        minor_version: "1".into(),
        patch_version: "0".into(),
        pre_release_version: "0".into(),
    }
}

pub fn snapshot(
    environment: Environment,
    node_id: &str,
    block_count: u64,
    cemented_count: u64,
    timestamp: i64,
) -> NodeSnapshot {
    NodeSnapshot::from_raw(
        environment,
        &raw(node_id, block_count, cemented_count),
        timestamp,
    )
}

pub async fn temp_store() -> (TempDir, Arc<SqliteSnapshotStore>) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("snapshots.db");
    let store = SqliteSnapshotStore::connect(path.to_str().unwrap(), 2)
        .await
        .unwrap();
    store.init().await.unwrap();
    (dir, Arc::new(store))
}

#[derive(Clone)]
pub enum Script {
    Metrics(Vec<RawMetric>),
    MissingCredentials,
    Unavailable,
    Malformed,
}

/// TelemetrySource that replays a fixed answer per environment.
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<Environment, Script>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with(self, environment: Environment, script: Script) -> Self {
        self.set(environment, script);
        self
    }

    pub fn set(&self, environment: Environment, script: Script) {
        self.scripts.lock().unwrap().insert(environment, script);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TelemetrySource for ScriptedFetcher {
    async fn fetch(&self, environment: Environment) -> Result<Vec<RawMetric>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&environment)
            .cloned()
            .unwrap_or(Script::Metrics(vec![]));
        match script {
            Script::Metrics(m) => Ok(m),
            Script::MissingCredentials => {
                Err(FetchError::Auth(ConfigError::MissingCredentials { environment }))
            }
            Script::Unavailable => Err(FetchError::Status(503)),
            Script::Malformed => Err(FetchError::Malformed("not json".into())),
        }
    }
}

/// Store whose writes always fail and whose reads are always empty.
pub struct FailingStore;

#[async_trait]
impl SnapshotStore for FailingStore {
    async fn append_batch(&self, _snapshots: &[NodeSnapshot]) -> Result<(), PersistenceError> {
        Err(PersistenceError::Write(sqlx::Error::PoolClosed))
    }

    async fn query_latest_before(
        &self,
        _node_id: &str,
        _environment: Environment,
        _not_after: i64,
        _max_age_ms: i64,
    ) -> Result<Option<NodeSnapshot>, PersistenceError> {
        Ok(None)
    }

    async fn query_range(
        &self,
        _node_id: Option<&str>,
        _environment: Environment,
        _from: i64,
        _to: i64,
    ) -> Result<Vec<NodeSnapshot>, PersistenceError> {
        Ok(vec![])
    }

    async fn prune_before(&self, _cutoff: i64) -> Result<u64, PersistenceError> {
        Ok(0)
    }

    async fn vacuum(&self) -> Result<(), PersistenceError> {
        Ok(())
    }
}
