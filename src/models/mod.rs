// Domain models: environments, snapshots, enriched metrics

mod environment;
mod metric;
mod snapshot;

pub use environment::{Environment, UnknownEnvironment};
pub use metric::{EnrichedMetric, MetricsReport};
pub use snapshot::{HistoryPoint, NodeSnapshot, RawMetric, format_version};

/// Current wall-clock time as Unix milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub const MS_PER_HOUR: i64 = 60 * 60 * 1000;
pub const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;
