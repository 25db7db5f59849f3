// Append-only snapshot persistence. Every query is scoped to one environment.

mod sqlite;

pub use sqlite::SqliteSnapshotStore;

use async_trait::async_trait;

use crate::error::PersistenceError;
use crate::models::{Environment, NodeSnapshot};

/// Storage contract shared by the collector (writer) and the on-demand path (reader).
/// All timestamps are Unix milliseconds.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist one snapshot.
    async fn append(&self, snapshot: &NodeSnapshot) -> Result<(), PersistenceError> {
        self.append_batch(std::slice::from_ref(snapshot)).await
    }

    /// Persist a batch atomically: either every snapshot is stored or none is.
    async fn append_batch(&self, snapshots: &[NodeSnapshot]) -> Result<(), PersistenceError>;

    /// Most recent snapshot of `node_id` with `not_after - max_age_ms <= timestamp <= not_after`.
    /// Snapshots older than the lookback bound do not count, even if they are the closest match.
    async fn query_latest_before(
        &self,
        node_id: &str,
        environment: Environment,
        not_after: i64,
        max_age_ms: i64,
    ) -> Result<Option<NodeSnapshot>, PersistenceError>;

    /// Snapshots with timestamp in `[from, to)`, ascending. `None` selects every node.
    async fn query_range(
        &self,
        node_id: Option<&str>,
        environment: Environment,
        from: i64,
        to: i64,
    ) -> Result<Vec<NodeSnapshot>, PersistenceError>;

    /// Delete snapshots older than `cutoff`. Operator retention policy only; the
    /// collector and aggregator never call this.
    async fn prune_before(&self, cutoff: i64) -> Result<u64, PersistenceError>;

    /// Reclaim space after pruning.
    async fn vacuum(&self) -> Result<(), PersistenceError>;
}
