// HTTP query surface: on-demand enrichment, node history, collector control

mod error;
mod http;

pub use error::{ApiError, ErrorBody};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::collector::Collector;
use crate::service::MetricsService;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) service: Arc<MetricsService>,
    pub(crate) collector: Arc<Collector>,
    pub(crate) collector_enabled: bool,
}

pub fn app(
    service: Arc<MetricsService>,
    collector: Arc<Collector>,
    collector_enabled: bool,
) -> Router {
    let state = AppState {
        service,
        collector,
        collector_enabled,
    };
    Router::new()
        .route("/", get(|| async { "nodewatch: peer telemetry collector" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/get_metrics", get(http::legacy_metrics_handler)) // GET /get_metrics
        .route("/api/metrics", get(http::metrics_handler)) // GET /api/metrics?environment=
        .route("/api/nodes/{node_id}/history", get(http::node_history_handler)) // GET /api/nodes/{id}/history
        .route("/api/collector/status", get(http::collector_status_handler)) // GET /api/collector/status
        .route("/api/collector/run", post(http::collector_run_handler)) // POST /api/collector/run
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
