// Response-only types: a fresh metric plus derived rates. Never persisted.

use serde::{Deserialize, Serialize};

use super::Environment;

/// Fresh node metric with derived growth rates.
/// A rate is `None` when there is no usable reference snapshot for its window
/// or the counter went backwards; `None` never means "no activity".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedMetric {
    pub environment: Environment,
    pub node_id: String,
    pub address: String,
    pub block_count: u64,
    pub cemented_count: u64,
    pub major_version: String,
    pub minor_version: String,
    pub patch_version: String,
    pub pre_release_version: String,
    pub version: String,
    /// Enrichment time (Unix ms).
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hourly_blocks: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hourly_cemented: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_blocks: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_cemented: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cemented_percent: Option<f64>,
    #[serde(default)]
    pub bootstrapping: bool,
}

/// Result of one on-demand enrichment for an environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub environment: Environment,
    pub metrics: Vec<EnrichedMetric>,
    pub max_block_count: u64,
    pub max_cemented_count: u64,
}
