//! Maps raw engine stats onto the canonical [`ContainerStats`] shape.
//!
//! Scalar fields are copied according to a static table of [`FieldMapping`]s, one table per
//! [`UserTimeSource`]. Sequences (per-core usage, block I/O) are copied by dedicated code.
//!
//! # Upstream mapping quirks
//!
//! Two behaviors of the established mapping are preserved by default and can only be
//! changed through [`NormalizerConfig`]:
//!
//! - `cpu.usage.user` is read from the kernel-mode counter, so it mirrors
//!   `cpu.usage.system`. [`UserTimeSource::UserMode`] reads the user-mode counter instead.
//! - Every block I/O tuple becomes its own [`PerDiskStats`] entry.
//!   [`BlkioGrouping::MergeByDevice`] folds tuples of the same device into one entry.
//!
//! # Example
//!
//! ```rust
//! use creo_stats::stats::{Normalizer, NormalizerConfig, RawStatsRecord, UserTimeSource};
//!
//! let mut raw = RawStatsRecord::default();
//! raw.cpu_stats.cpu_usage.total_usage = 1_000_000_000;
//! raw.cpu_stats.cpu_usage.usage_in_kernelmode = 200_000_000;
//! raw.cpu_stats.cpu_usage.usage_in_usermode = 300_000_000;
//!
//! let stats = Normalizer::default().normalize(&raw);
//! assert_eq!(stats.cpu.usage.user, 200_000_000);
//!
//! let config = NormalizerConfig {
//!     user_time: UserTimeSource::UserMode,
//!     ..Default::default()
//! };
//! let stats = Normalizer::new(config).normalize(&raw);
//! assert_eq!(stats.cpu.usage.user, 300_000_000);
//! ```

use std::collections::{BTreeMap, HashMap};

use super::raw::{BlkioEntry, RawStatsRecord};
use super::{ContainerStats, PerDiskStats};

/// Selects the raw counter that feeds `cpu.usage.user`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UserTimeSource {
    /// Mirror the kernel-mode counter, reproducing the established mapping.
    #[default]
    KernelMode,
    /// Read `usage_in_usermode`.
    UserMode,
}

/// Selects how block I/O tuples are grouped into [`PerDiskStats`] entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlkioGrouping {
    /// One entry per raw tuple, in input order.
    #[default]
    PerEntry,
    /// One entry per `(major, minor)` device, in order of first appearance.
    MergeByDevice,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizerConfig {
    pub user_time: UserTimeSource,
    pub blkio: BlkioGrouping,
}

type Reader = fn(&RawStatsRecord) -> u64;
type Writer = fn(&mut ContainerStats, u64);

/// A single scalar copy from a raw record path to a canonical snapshot path.
#[derive(Debug, Clone, Copy)]
pub struct FieldMapping {
    /// Dotted path of the source field in the raw record.
    pub source: &'static str,
    /// Dotted path of the destination field in the canonical snapshot.
    pub destination: &'static str,
    read: Reader,
    write: Writer,
}

impl FieldMapping {
    const fn new(
        source: &'static str,
        destination: &'static str,
        read: Reader,
        write: Writer,
    ) -> Self {
        Self {
            source,
            destination,
            read,
            write,
        }
    }

    fn apply(&self, raw: &RawStatsRecord, out: &mut ContainerStats) {
        (self.write)(out, (self.read)(raw));
    }
}

fn total_usage(raw: &RawStatsRecord) -> u64 {
    raw.cpu_stats.cpu_usage.total_usage
}

fn usage_in_kernelmode(raw: &RawStatsRecord) -> u64 {
    raw.cpu_stats.cpu_usage.usage_in_kernelmode
}

fn usage_in_usermode(raw: &RawStatsRecord) -> u64 {
    raw.cpu_stats.cpu_usage.usage_in_usermode
}

fn memory_usage(raw: &RawStatsRecord) -> u64 {
    raw.memory_stats.usage
}

fn set_cpu_total(out: &mut ContainerStats, v: u64) {
    out.cpu.usage.total = v;
}

fn set_cpu_system(out: &mut ContainerStats, v: u64) {
    out.cpu.usage.system = v;
}

fn set_cpu_user(out: &mut ContainerStats, v: u64) {
    out.cpu.usage.user = v;
}

fn set_memory_usage(out: &mut ContainerStats, v: u64) {
    out.memory.usage = v;
}

static KERNEL_MODE_MAPPINGS: [FieldMapping; 4] = [
    FieldMapping::new(
        "cpu_stats.cpu_usage.total_usage",
        "cpu.usage.total",
        total_usage,
        set_cpu_total,
    ),
    FieldMapping::new(
        "cpu_stats.cpu_usage.usage_in_kernelmode",
        "cpu.usage.system",
        usage_in_kernelmode,
        set_cpu_system,
    ),
    FieldMapping::new(
        "cpu_stats.cpu_usage.usage_in_kernelmode",
        "cpu.usage.user",
        usage_in_kernelmode,
        set_cpu_user,
    ),
    FieldMapping::new(
        "memory_stats.usage",
        "memory.usage",
        memory_usage,
        set_memory_usage,
    ),
];

static USER_MODE_MAPPINGS: [FieldMapping; 4] = [
    FieldMapping::new(
        "cpu_stats.cpu_usage.total_usage",
        "cpu.usage.total",
        total_usage,
        set_cpu_total,
    ),
    FieldMapping::new(
        "cpu_stats.cpu_usage.usage_in_kernelmode",
        "cpu.usage.system",
        usage_in_kernelmode,
        set_cpu_system,
    ),
    FieldMapping::new(
        "cpu_stats.cpu_usage.usage_in_usermode",
        "cpu.usage.user",
        usage_in_usermode,
        set_cpu_user,
    ),
    FieldMapping::new(
        "memory_stats.usage",
        "memory.usage",
        memory_usage,
        set_memory_usage,
    ),
];

/// Converts raw engine records into canonical snapshots.
///
/// Normalization is pure: it performs no I/O, cannot fail, and yields identical output for
/// identical input. The network section of the result is always empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> NormalizerConfig {
        self.config
    }

    /// Returns the scalar field mappings applied under the current configuration.
    pub fn field_mappings(&self) -> &'static [FieldMapping] {
        match self.config.user_time {
            UserTimeSource::KernelMode => &KERNEL_MODE_MAPPINGS,
            UserTimeSource::UserMode => &USER_MODE_MAPPINGS,
        }
    }

    pub fn normalize(&self, raw: &RawStatsRecord) -> ContainerStats {
        let mut out = ContainerStats {
            timestamp: raw.read,
            ..Default::default()
        };

        for mapping in self.field_mappings() {
            mapping.apply(raw, &mut out);
        }
        out.cpu.usage.per_cpu = raw.cpu_stats.cpu_usage.percpu_usage.clone();

        let entries = &raw.blkio_stats.io_service_bytes_recursive;
        out.diskio.io_service_bytes = match self.config.blkio {
            BlkioGrouping::PerEntry => entries.iter().map(per_entry).collect(),
            BlkioGrouping::MergeByDevice => merge_by_device(entries),
        };

        out
    }
}

fn per_entry(entry: &BlkioEntry) -> PerDiskStats {
    PerDiskStats {
        major: entry.major,
        minor: entry.minor,
        stats: BTreeMap::from([(entry.op.clone(), entry.value)]),
    }
}

fn merge_by_device(entries: &[BlkioEntry]) -> Vec<PerDiskStats> {
    let mut out: Vec<PerDiskStats> = Vec::new();
    let mut positions: HashMap<(u64, u64), usize> = HashMap::new();

    for entry in entries {
        let pos = *positions
            .entry((entry.major, entry.minor))
            .or_insert_with(|| {
                out.push(PerDiskStats {
                    major: entry.major,
                    minor: entry.minor,
                    stats: BTreeMap::new(),
                });
                out.len() - 1
            });
        // Later tuples for the same operation overwrite earlier ones.
        out[pos].stats.insert(entry.op.clone(), entry.value);
    }

    out
}
