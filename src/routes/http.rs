// Handlers: metrics, node history, collector status/run, version

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{ApiError, AppState};
use crate::collector::{CollectorStats, CycleReport};
use crate::models::{Environment, HistoryPoint, MS_PER_HOUR, MetricsReport, now_ms};

const NAME: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default chart span: one week.
const DEFAULT_HISTORY_HOURS: u32 = 168;
const MAX_HISTORY_HOURS: u32 = 24 * 366;

#[derive(Debug, Deserialize)]
pub(super) struct EnvironmentQuery {
    environment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct HistoryQuery {
    environment: Option<String>,
    hours: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CollectorStatus {
    pub enabled: bool,
    pub environments: Vec<Environment>,
    pub stats: CollectorStats,
}

fn parse_environment(raw: Option<&str>) -> Result<Environment, ApiError> {
    match raw {
        None => Ok(Environment::Live),
        Some(s) => Environment::from_str(s).map_err(|e| ApiError::BadRequest(e.to_string())),
    }
}

/// GET /version: service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /get_metrics: live environment report, kept for the original dashboard.
pub(super) async fn legacy_metrics_handler(
    State(state): State<AppState>,
) -> Result<Json<MetricsReport>, ApiError> {
    Ok(Json(state.service.enrich_now(Environment::Live).await?))
}

/// GET /api/metrics?environment=beta|live: fetch now and enrich against history.
pub(super) async fn metrics_handler(
    State(state): State<AppState>,
    Query(query): Query<EnvironmentQuery>,
) -> Result<Json<MetricsReport>, ApiError> {
    let environment = parse_environment(query.environment.as_deref())?;
    Ok(Json(state.service.enrich_now(environment).await?))
}

/// GET /api/nodes/{node_id}/history?environment=..&hours=N: ascending chart points.
pub(super) async fn node_history_handler(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryPoint>>, ApiError> {
    let environment = parse_environment(query.environment.as_deref())?;
    let hours = query.hours.unwrap_or(DEFAULT_HISTORY_HOURS);
    if hours == 0 || hours > MAX_HISTORY_HOURS {
        return Err(ApiError::BadRequest(format!(
            "hours must be between 1 and {}, got {}",
            MAX_HISTORY_HOURS, hours
        )));
    }
    let to = now_ms() + 1;
    let from = to - (hours as i64) * MS_PER_HOUR;
    let points = state
        .service
        .node_history(environment, &node_id, from, to)
        .await?;
    Ok(Json(points))
}

/// GET /api/collector/status: totals since startup.
pub(super) async fn collector_status_handler(
    State(state): State<AppState>,
) -> Json<CollectorStatus> {
    Json(CollectorStatus {
        enabled: state.collector_enabled,
        environments: state.collector.environments().to_vec(),
        stats: state.collector.stats(),
    })
}

/// POST /api/collector/run: one cycle now; environments already running report `skipped`.
pub(super) async fn collector_run_handler(
    State(state): State<AppState>,
) -> Json<Vec<CycleReport>> {
    Json(state.collector.run_cycle().await)
}
