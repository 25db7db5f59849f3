use serde::Deserialize;
use std::collections::HashSet;

use crate::aggregator::AggregationSettings;
use crate::models::Environment;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_pool_size: u32,
    /// Snapshots older than this are pruned by the maintenance worker. Unset = keep forever.
    #[serde(default)]
    pub retention_days: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    /// How often to log collector totals at INFO level.
    #[serde(default = "default_stats_log_interval_secs")]
    pub stats_log_interval_secs: u64,
    #[serde(default = "default_environments")]
    pub environments: Vec<Environment>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: default_interval_minutes(),
            stats_log_interval_secs: default_stats_log_interval_secs(),
            environments: default_environments(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregationConfig {
    /// How far past the nominal 1h / 1d mark a reference snapshot may be and still count.
    #[serde(default = "default_lookback_slack_minutes")]
    pub lookback_slack_minutes: u64,
    /// Nodes whose cemented count is below this share of the batch maximum are bootstrapping.
    #[serde(default = "default_bootstrapping_threshold_percent")]
    pub bootstrapping_threshold_percent: f64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            lookback_slack_minutes: default_lookback_slack_minutes(),
            bootstrapping_threshold_percent: default_bootstrapping_threshold_percent(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    pub beta: EndpointConfig,
    pub live: EndpointConfig,
}

impl TelemetryConfig {
    pub fn endpoint(&self, environment: Environment) -> &EndpointConfig {
        match environment {
            Environment::Beta => &self.beta,
            Environment::Live => &self.live,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
    #[serde(default)]
    pub requires_auth: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceConfig {
    /// Optional cron expression for VACUUM (e.g. "0 0 3 * * *"). Uses local time.
    #[serde(default)]
    pub vacuum_schedule: Option<String>,
    /// Run VACUUM every N seconds when vacuum_schedule is not set.
    #[serde(default = "default_vacuum_interval_secs")]
    pub vacuum_interval_secs: u64,
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            vacuum_schedule: None,
            vacuum_interval_secs: default_vacuum_interval_secs(),
            prune_interval_secs: default_prune_interval_secs(),
        }
    }
}

const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;
const MAX_LOOKBACK_SLACK_MINUTES: u64 = 24 * 60;
const MAX_TIMER_SECS: u64 = 30 * 24 * 60 * 60;
const MAX_TIMEOUT_SECS: u64 = 3600;

fn default_true() -> bool {
    true
}

fn default_interval_minutes() -> u64 {
    30
}

fn default_stats_log_interval_secs() -> u64 {
    3600
}

fn default_environments() -> Vec<Environment> {
    Environment::ALL.to_vec()
}

fn default_lookback_slack_minutes() -> u64 {
    30
}

fn default_bootstrapping_threshold_percent() -> f64 {
    95.0
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_vacuum_interval_secs() -> u64 {
    86_400
}

fn default_prune_interval_secs() -> u64 {
    3600
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn aggregation_settings(&self) -> AggregationSettings {
        AggregationSettings {
            lookback_slack_ms: (self.aggregation.lookback_slack_minutes as i64) * 60 * 1000,
            bootstrapping_threshold_percent: self.aggregation.bootstrapping_threshold_percent,
        }
    }

    // Credentials are checked at fetch time, not here.
    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.database.max_pool_size > 0,
            "database.max_pool_size must be > 0, got {}",
            self.database.max_pool_size
        );
        if let Some(days) = self.database.retention_days {
            anyhow::ensure!(
                days > 0,
                "database.retention_days must be > 0 when set, got {}",
                days
            );
        }
        anyhow::ensure!(
            (1..=MAX_INTERVAL_MINUTES).contains(&self.collector.interval_minutes),
            "collector.interval_minutes must be between 1 and {}, got {}",
            MAX_INTERVAL_MINUTES,
            self.collector.interval_minutes
        );
        anyhow::ensure!(
            (1..=MAX_TIMER_SECS).contains(&self.collector.stats_log_interval_secs),
            "collector.stats_log_interval_secs must be between 1 and {}, got {}",
            MAX_TIMER_SECS,
            self.collector.stats_log_interval_secs
        );
        anyhow::ensure!(
            !self.collector.environments.is_empty(),
            "collector.environments must list at least one environment"
        );
        let unique: HashSet<_> = self.collector.environments.iter().collect();
        anyhow::ensure!(
            unique.len() == self.collector.environments.len(),
            "collector.environments must not contain duplicates"
        );
        anyhow::ensure!(
            (1..=MAX_LOOKBACK_SLACK_MINUTES).contains(&self.aggregation.lookback_slack_minutes),
            "aggregation.lookback_slack_minutes must be between 1 and {}, got {}",
            MAX_LOOKBACK_SLACK_MINUTES,
            self.aggregation.lookback_slack_minutes
        );
        let threshold = self.aggregation.bootstrapping_threshold_percent;
        anyhow::ensure!(
            threshold > 0.0 && threshold <= 100.0,
            "aggregation.bootstrapping_threshold_percent must be in (0, 100], got {}",
            threshold
        );
        anyhow::ensure!(
            (1..=MAX_TIMEOUT_SECS).contains(&self.telemetry.timeout_secs),
            "telemetry.timeout_secs must be between 1 and {}, got {}",
            MAX_TIMEOUT_SECS,
            self.telemetry.timeout_secs
        );
        for env in Environment::ALL {
            anyhow::ensure!(
                !self.telemetry.endpoint(env).url.is_empty(),
                "telemetry.{}.url must be non-empty",
                env
            );
        }
        anyhow::ensure!(
            (1..=MAX_TIMER_SECS).contains(&self.maintenance.vacuum_interval_secs),
            "maintenance.vacuum_interval_secs must be between 1 and {}, got {}",
            MAX_TIMER_SECS,
            self.maintenance.vacuum_interval_secs
        );
        anyhow::ensure!(
            (1..=MAX_TIMER_SECS).contains(&self.maintenance.prune_interval_secs),
            "maintenance.prune_interval_secs must be between 1 and {}, got {}",
            MAX_TIMER_SECS,
            self.maintenance.prune_interval_secs
        );
        Ok(())
    }
}
