// Raw telemetry records and persisted per-node snapshots.

use serde::de::{Deserializer, Error as _};
use serde::{Deserialize, Serialize};

use super::Environment;

/// One node as reported by the telemetry proxy, after type coercion.
/// Absent counts decode to 0, absent strings to "".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMetric {
    #[serde(default, deserialize_with = "count_from_any")]
    pub block_count: u64,
    #[serde(default, deserialize_with = "count_from_any")]
    pub cemented_count: u64,
    #[serde(default, deserialize_with = "string_from_any")]
    pub address: String,
    #[serde(default, deserialize_with = "string_from_any")]
    pub node_id: String,
    #[serde(default, deserialize_with = "string_from_any")]
    pub major_version: String,
    #[serde(default, deserialize_with = "string_from_any")]
    pub minor_version: String,
    #[serde(default, deserialize_with = "string_from_any")]
    pub patch_version: String,
    #[serde(default, deserialize_with = "string_from_any")]
    pub pre_release_version: String,
}

impl RawMetric {
    pub fn version(&self) -> String {
        format_version(
            &self.major_version,
            &self.minor_version,
            &self.patch_version,
            &self.pre_release_version,
        )
    }
}

/// One stored observation of one node. Immutable once appended.
/// `timestamp` is collector time in Unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub environment: Environment,
    pub node_id: String,
    pub address: String,
    pub block_count: u64,
    pub cemented_count: u64,
    pub major_version: String,
    pub minor_version: String,
    pub patch_version: String,
    pub pre_release_version: String,
    pub timestamp: i64,
}

impl NodeSnapshot {
    pub fn from_raw(environment: Environment, raw: &RawMetric, timestamp: i64) -> Self {
        Self {
            environment,
            node_id: raw.node_id.clone(),
            address: raw.address.clone(),
            block_count: raw.block_count,
            cemented_count: raw.cemented_count,
            major_version: raw.major_version.clone(),
            minor_version: raw.minor_version.clone(),
            patch_version: raw.patch_version.clone(),
            pre_release_version: raw.pre_release_version.clone(),
            timestamp,
        }
    }

    pub fn version(&self) -> String {
        format_version(
            &self.major_version,
            &self.minor_version,
            &self.patch_version,
            &self.pre_release_version,
        )
    }
}

/// One point of a node's history chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub timestamp: i64,
    pub block_count: u64,
    pub cemented_count: u64,
    pub version: String,
}

impl From<&NodeSnapshot> for HistoryPoint {
    fn from(s: &NodeSnapshot) -> Self {
        Self {
            timestamp: s.timestamp,
            block_count: s.block_count,
            cemented_count: s.cemented_count,
            version: s.version(),
        }
    }
}

/// `major.minor.patch`, plus `_DB{pre}` for a non-empty pre-release other than "0".
pub fn format_version(major: &str, minor: &str, patch: &str, pre_release: &str) -> String {
    let mut out = format!("{}.{}.{}", major, minor, patch);
    let pre = pre_release.trim();
    if !pre.is_empty() && pre != "0" {
        out.push_str("_DB");
        out.push_str(pre);
    }
    out
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CountRepr {
    Int(u64),
    Text(String),
    Float(f64),
}

// Counts are persisted as SQLite integers, so anything above i64::MAX is rejected.
fn count_from_any<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let count = parse_count::<D::Error>(Option::<CountRepr>::deserialize(deserializer)?)?;
    if count > i64::MAX as u64 {
        return Err(D::Error::custom(format!("count {} out of range", count)));
    }
    Ok(count)
}

fn parse_count<E: serde::de::Error>(repr: Option<CountRepr>) -> Result<u64, E> {
    match repr {
        None => Ok(0),
        Some(CountRepr::Int(n)) => Ok(n),
        Some(CountRepr::Text(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(0);
            }
            s.parse::<u64>()
                .map_err(|_| E::custom(format!("invalid count {:?}", s)))
        }
        Some(CountRepr::Float(f)) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => {
            Ok(f as u64)
        }
        Some(CountRepr::Float(f)) => Err(E::custom(format!("invalid count {}", f))),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringRepr {
    Text(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
}

fn string_from_any<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<StringRepr>::deserialize(deserializer)? {
        None => String::new(),
        Some(StringRepr::Text(s)) => s,
        Some(StringRepr::Int(n)) => n.to_string(),
        Some(StringRepr::UInt(n)) => n.to_string(),
        Some(StringRepr::Float(f)) => f.to_string(),
        Some(StringRepr::Bool(b)) => b.to_string(),
    })
}
