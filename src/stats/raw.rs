//! Wire types for the container engine's streaming stats API.
//!
//! Every field is optional on the wire: absent fields and explicit `null`s both decode to
//! zero or empty values, since engines omit sections depending on the cgroup version and
//! the platform they run on (e.g. `percpu_usage` is missing on cgroup v2 hosts).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Deserializes `null` into `T::default()`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A single stats document as emitted by the container engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RawStatsRecord {
    #[serde(deserialize_with = "null_as_default")]
    pub read: DateTime<Utc>,
    #[serde(deserialize_with = "null_as_default")]
    pub pids_stats: PidsStats,
    /// Per-interface counters as seen by the engine, kept undecoded. Superseded by
    /// namespace enrichment.
    #[serde(deserialize_with = "null_as_default")]
    pub networks: HashMap<String, Value>,
    #[serde(deserialize_with = "null_as_default")]
    pub blkio_stats: BlkioStats,
    #[serde(deserialize_with = "null_as_default")]
    pub memory_stats: MemoryStats,
    #[serde(deserialize_with = "null_as_default")]
    pub cpu_stats: CpuStats,
    #[serde(deserialize_with = "null_as_default")]
    pub precpu_stats: CpuStats,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PidsStats {
    #[serde(deserialize_with = "null_as_default")]
    pub current: u64,
}

/// A single `{major, minor, op, value}` tuple of a recursive block I/O list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BlkioEntry {
    pub major: u64,
    pub minor: u64,
    pub op: String,
    pub value: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BlkioStats {
    #[serde(deserialize_with = "null_as_default")]
    pub io_service_bytes_recursive: Vec<BlkioEntry>,
    #[serde(deserialize_with = "null_as_default")]
    pub io_serviced_recursive: Vec<BlkioEntry>,
    #[serde(deserialize_with = "null_as_default")]
    pub io_queue_recursive: Vec<BlkioEntry>,
    #[serde(deserialize_with = "null_as_default")]
    pub io_service_time_recursive: Vec<BlkioEntry>,
    #[serde(deserialize_with = "null_as_default")]
    pub io_wait_time_recursive: Vec<BlkioEntry>,
    #[serde(deserialize_with = "null_as_default")]
    pub io_merged_recursive: Vec<BlkioEntry>,
    #[serde(deserialize_with = "null_as_default")]
    pub io_time_recursive: Vec<BlkioEntry>,
    #[serde(deserialize_with = "null_as_default")]
    pub sectors_recursive: Vec<BlkioEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MemoryStats {
    /// Detailed cgroup memory counters (`cache`, `rss`, `pgfault`, ...), keyed by name.
    /// Values are kept as sent; engines add keys of their own, not all of them integers.
    #[serde(deserialize_with = "null_as_default")]
    pub stats: HashMap<String, Value>,
    pub max_usage: u64,
    pub usage: u64,
    pub failcnt: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CpuStats {
    #[serde(deserialize_with = "null_as_default")]
    pub cpu_usage: CpuUsage,
    pub system_cpu_usage: u64,
    pub online_cpus: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub throttling_data: ThrottlingData,
}

/// CPU time in nanoseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CpuUsage {
    #[serde(deserialize_with = "null_as_default")]
    pub percpu_usage: Vec<u64>,
    pub usage_in_usermode: u64,
    pub total_usage: u64,
    pub usage_in_kernelmode: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ThrottlingData {
    pub periods: u64,
    pub throttled_periods: u64,
    pub throttled_time: u64,
}
