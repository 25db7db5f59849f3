// Telemetry fetcher: one POST per call to an environment's RPC proxy.
// Environment-specific URL and credentials are resolved here and nowhere else.
// No retries; the collector decides what a failure means.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;

use crate::config::{EndpointConfig, TelemetryConfig};
use crate::error::{ConfigError, FetchError};
use crate::models::{Environment, RawMetric};

/// Source of raw per-node metrics for an environment.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn fetch(&self, environment: Environment) -> Result<Vec<RawMetric>, FetchError>;
}

#[derive(Debug, Serialize)]
struct TelemetryRequest {
    action: &'static str,
    raw: &'static str,
}

/// "bulk telemetry, raw mode"
const RAW_TELEMETRY: TelemetryRequest = TelemetryRequest {
    action: "telemetry",
    raw: "true",
};

#[derive(Debug, Deserialize)]
struct TelemetryResponse {
    #[serde(default)]
    metrics: Option<MetricsField>,
    #[serde(default)]
    error: Option<String>,
}

// The node RPC renders an empty list as "".
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MetricsField {
    List(Vec<RawMetric>),
    Empty(String),
}

#[derive(Debug, Clone)]
enum EndpointAuth {
    Anonymous,
    Basic {
        username: Option<String>,
        password: Option<String>,
    },
}

#[derive(Debug, Clone)]
struct Endpoint {
    url: String,
    auth: EndpointAuth,
}

impl Endpoint {
    fn from_config(config: &EndpointConfig) -> Self {
        let auth = if config.requires_auth {
            EndpointAuth::Basic {
                username: config.username.clone(),
                password: config.password.clone(),
            }
        } else {
            EndpointAuth::Anonymous
        };
        Self {
            url: config.url.clone(),
            auth,
        }
    }

    fn credentials(&self, environment: Environment) -> Result<Option<(&str, &str)>, ConfigError> {
        match &self.auth {
            EndpointAuth::Anonymous => Ok(None),
            EndpointAuth::Basic {
                username: Some(user),
                password: Some(pass),
            } if !user.is_empty() => Ok(Some((user.as_str(), pass.as_str()))),
            EndpointAuth::Basic { .. } => Err(ConfigError::MissingCredentials { environment }),
        }
    }
}

/// Fetches from the beta and live RPC proxies over HTTP.
pub struct ProxyFetcher {
    client: reqwest::Client,
    beta: Endpoint,
    live: Endpoint,
    timeout_secs: u64,
}

impl ProxyFetcher {
    pub fn new(config: &TelemetryConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            beta: Endpoint::from_config(&config.beta),
            live: Endpoint::from_config(&config.live),
            timeout_secs: config.timeout_secs,
        })
    }

    fn endpoint(&self, environment: Environment) -> &Endpoint {
        match environment {
            Environment::Beta => &self.beta,
            Environment::Live => &self.live,
        }
    }

    fn classify(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.timeout_secs)
        } else if e.is_decode() {
            FetchError::Malformed(e.to_string())
        } else {
            FetchError::Transport(e)
        }
    }
}

#[async_trait]
impl TelemetrySource for ProxyFetcher {
    #[instrument(skip(self), fields(operation = "fetch_telemetry"))]
    async fn fetch(&self, environment: Environment) -> Result<Vec<RawMetric>, FetchError> {
        let endpoint = self.endpoint(environment);
        let mut request = self.client.post(&endpoint.url).json(&RAW_TELEMETRY);
        if let Some((user, pass)) = endpoint.credentials(environment)? {
            request = request.basic_auth(user, Some(pass));
        }

        let response = request.send().await.map_err(|e| self.classify(e))?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FetchError::Unauthorized(status.as_u16()));
        }
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        let metrics = parse_response(&body)?;
        tracing::debug!(nodes = metrics.len(), "telemetry fetched");
        Ok(metrics)
    }
}

/// Decode a proxy response body into raw metrics.
pub fn parse_response(body: &[u8]) -> Result<Vec<RawMetric>, FetchError> {
    let parsed: TelemetryResponse =
        serde_json::from_slice(body).map_err(|e| FetchError::Malformed(e.to_string()))?;
    if let Some(error) = parsed.error {
        return Err(FetchError::Malformed(format!("proxy error: {}", error)));
    }
    match parsed.metrics {
        Some(MetricsField::List(metrics)) => Ok(metrics),
        Some(MetricsField::Empty(s)) if s.trim().is_empty() => Ok(Vec::new()),
        Some(MetricsField::Empty(s)) => Err(FetchError::Malformed(format!(
            "unexpected \"metrics\" value {:?}",
            s
        ))),
        None => Err(FetchError::Malformed(
            "response has no \"metrics\" array".into(),
        )),
    }
}
