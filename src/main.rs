use anyhow::Result;
use nodewatch::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;

    let sqlite = store::SqliteSnapshotStore::connect(
        &app_config.database.path,
        app_config.database.max_pool_size,
    )
    .await?;
    sqlite.init().await?;
    let store: Arc<dyn store::SnapshotStore> = Arc::new(sqlite);

    let fetcher: Arc<dyn telemetry::TelemetrySource> =
        Arc::new(telemetry::ProxyFetcher::new(&app_config.telemetry)?);

    let collector = Arc::new(collector::Collector::new(
        fetcher.clone(),
        store.clone(),
        app_config.collector.environments.clone(),
    ));
    let service = Arc::new(service::MetricsService::new(
        fetcher,
        store.clone(),
        app_config.aggregation_settings(),
    ));

    let collector_handle = if app_config.collector.enabled {
        tracing::info!(
            interval_minutes = app_config.collector.interval_minutes,
            environments = ?app_config.collector.environments,
            "starting collector"
        );
        Some(collector::spawn(
            collector.clone(),
            collector::SchedulerConfig {
                interval_minutes: app_config.collector.interval_minutes,
                stats_log_interval_secs: app_config.collector.stats_log_interval_secs,
            },
        ))
    } else {
        tracing::info!("collector disabled; serving stored history only");
        None
    };

    if let Some(retention_days) = app_config.database.retention_days {
        maintenance_worker::spawn(
            store.clone(),
            maintenance_worker::MaintenanceWorkerConfig {
                retention_days,
                prune_interval_secs: app_config.maintenance.prune_interval_secs,
                vacuum_schedule: app_config.maintenance.vacuum_schedule.clone(),
                vacuum_interval_secs: app_config.maintenance.vacuum_interval_secs,
            },
        );
    }

    let app = routes::app(service, collector, app_config.collector.enabled);
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Received shutdown signal");
    if let Some(handle) = collector_handle {
        handle.stop().await;
    }
    Ok(())
}
