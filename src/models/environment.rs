// Monitored network deployments. Every query and write is scoped to one.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Beta,
    Live,
}

impl Environment {
    pub const ALL: [Environment; 2] = [Environment::Beta, Environment::Live];

    /// Value stored in the `environment` column and used in URLs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Beta => "beta",
            Environment::Live => "live",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown environment {0:?} (expected \"beta\" or \"live\")")]
pub struct UnknownEnvironment(pub String);

impl FromStr for Environment {
    type Err = UnknownEnvironment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beta" => Ok(Environment::Beta),
            "live" => Ok(Environment::Live),
            _ => Err(UnknownEnvironment(s.to_string())),
        }
    }
}
