//! This module converts the container engine's streaming stats into canonical, engine-agnostic
//! container snapshots.
//!
//! The pipeline is split into small, independently testable stages:
//!
//! - [`StreamDecoder`] reads newline-delimited stats documents into [`RawStatsRecord`]s.
//! - [`Normalizer`] maps a raw record onto a [`ContainerStats`] snapshot.
//! - [`crate::netns::NetworkEnricher`] fills the snapshot's network section from the
//!   container's own network namespace.
//! - [`Accumulator`] drives the stages above for a fixed number of samples and returns a
//!   [`ContainerInfo`] series, or an error and no series at all.
//!
//! # Output shape
//!
//! All types below serialize to the canonical schema:
//!
//! ```json
//! {
//!   "timestamp": "2024-05-01T10:00:00.5Z",
//!   "cpu": { "usage": { "total": 1000, "per_cpu_usage": [600, 400], "user": 200, "system": 200 } },
//!   "diskio": { "io_service_bytes": [ { "major": 8, "minor": 0, "stats": { "Read": 100 } } ] },
//!   "network": { "interfaces": [ { "name": "eth0", "rx_bytes": 10, "...": 0 } ] },
//!   "memory": { "usage": 4096 }
//! }
//! ```

mod accumulator;
mod decoder;
mod error;
mod normalize;
pub mod raw;

pub use accumulator::Accumulator;
pub use decoder::StreamDecoder;
pub use error::{Error, Result};
pub use normalize::{BlkioGrouping, FieldMapping, Normalizer, NormalizerConfig, UserTimeSource};
pub use raw::RawStatsRecord;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::container::ContainerID;

/// An ordered series of snapshots collected for a single container.
///
/// A `ContainerInfo` only exists with exactly as many snapshots as were requested; see
/// [`Accumulator::collect`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ContainerInfo {
    id: ContainerID,
    stats: Vec<ContainerStats>,
}

impl ContainerInfo {
    pub(crate) fn new(id: ContainerID, stats: Vec<ContainerStats>) -> Self {
        Self { id, stats }
    }

    pub fn id(&self) -> &ContainerID {
        &self.id
    }

    /// Returns the snapshots in read order.
    pub fn stats(&self) -> &[ContainerStats] {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }
}

/// One point-in-time measurement of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ContainerStats {
    /// Time at which the container engine read the underlying counters.
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub cpu: CpuStats,
    #[serde(default)]
    pub diskio: DiskIoStats,
    #[serde(default)]
    pub network: NetworkStats,
    #[serde(default)]
    pub memory: MemoryStats,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CpuStats {
    pub usage: CpuUsage,
}

/// CPU time consumed by the container. All values are in nanoseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CpuUsage {
    /// Total CPU usage.
    pub total: u64,
    /// Per CPU/core usage, ordered by core index.
    #[serde(rename = "per_cpu_usage", default, skip_serializing_if = "Vec::is_empty")]
    pub per_cpu: Vec<u64>,
    /// Time spent in user space.
    pub user: u64,
    /// Time spent in kernel space.
    pub system: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DiskIoStats {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub io_service_bytes: Vec<PerDiskStats>,
}

/// Block I/O counters of a single device, keyed by operation name (e.g. `Read`, `Write`).
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PerDiskStats {
    pub major: u64,
    pub minor: u64,
    pub stats: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NetworkStats {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<InterfaceStats>,
}

/// Cumulative counters of a single network interface.
///
/// Counters only grow for the lifetime of an interface; a decrease means the interface
/// was recreated.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct InterfaceStats {
    /// The name of the interface.
    pub name: String,
    /// Cumulative count of bytes received.
    pub rx_bytes: u64,
    /// Cumulative count of packets received.
    pub rx_packets: u64,
    /// Cumulative count of receive errors encountered.
    pub rx_errors: u64,
    /// Cumulative count of packets dropped while receiving.
    pub rx_dropped: u64,
    /// Cumulative count of bytes transmitted.
    pub tx_bytes: u64,
    /// Cumulative count of packets transmitted.
    pub tx_packets: u64,
    /// Cumulative count of transmit errors encountered.
    pub tx_errors: u64,
    /// Cumulative count of packets dropped while transmitting.
    pub tx_dropped: u64,
}

/// Memory usage in bytes, regardless of when the memory was last accessed.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MemoryStats {
    pub usage: u64,
}
