// Typed errors for the fetch, persistence and on-demand paths.
// Startup plumbing (config, connect, main) stays on anyhow.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Environment;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment {environment} requires credentials but telemetry.{environment}.username/password are not set")]
    MissingCredentials { environment: Environment },
}

/// Coarse classification of a [`FetchError`], used for logs, counters and HTTP codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchErrorKind {
    Transport,
    Auth,
    Malformed,
}

impl FetchErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchErrorKind::Transport => "transport",
            FetchErrorKind::Auth => "auth",
            FetchErrorKind::Malformed => "malformed",
        }
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("telemetry request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("telemetry request timed out after {0}s")]
    Timeout(u64),
    #[error("telemetry proxy answered HTTP {0}")]
    Status(u16),
    #[error(transparent)]
    Auth(#[from] ConfigError),
    #[error("telemetry proxy rejected credentials (HTTP {0})")]
    Unauthorized(u16),
    #[error("malformed telemetry response: {0}")]
    Malformed(String),
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Transport(_) | FetchError::Timeout(_) | FetchError::Status(_) => {
                FetchErrorKind::Transport
            }
            FetchError::Auth(_) | FetchError::Unauthorized(_) => FetchErrorKind::Auth,
            FetchError::Malformed(_) => FetchErrorKind::Malformed,
        }
    }
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("snapshot write failed: {0}")]
    Write(#[source] sqlx::Error),
    #[error("snapshot read failed: {0}")]
    Read(#[source] sqlx::Error),
}

/// Failure of the on-demand path. Missing history is never an error.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
