//! Network interface counters read from a container's own network namespace.
//!
//! The container engine reports network counters as well, but only for the interfaces it
//! manages. Reading the namespace directly yields every link the container can see.
//!
//! # Key Components
//!
//! - [`InterfaceResolver`] — the capability of resolving a process' namespace and listing
//!   its link counters. Implementations never fail: any error yields an empty mapping.
//! - [`ProcfsResolver`] — the production resolver, backed by `/proc/<pid>/ns/net` and
//!   `/proc/<pid>/net/dev`.
//! - [`NetworkEnricher`] — merges resolved counters into a [`ContainerStats`] snapshot.

mod error;
mod procfs;

pub use error::{Error, Result};
pub use procfs::ProcfsResolver;

use std::collections::BTreeMap;

use crate::stats::{ContainerStats, InterfaceStats};

/// Name of the loopback interface, which is never reported.
pub const LOOPBACK_INTERFACE: &str = "lo";

/// Resolves the network interfaces visible to a process and their cumulative counters.
pub trait InterfaceResolver {
    /// Returns the counters of every non-loopback interface in the network namespace of
    /// `pid`, keyed by interface name.
    ///
    /// Returns an empty mapping if the namespace or its links cannot be read. A partially
    /// populated mapping is never returned.
    fn resolve_interfaces(&self, pid: u32) -> BTreeMap<String, InterfaceStats>;
}

impl<T: InterfaceResolver + ?Sized> InterfaceResolver for &T {
    fn resolve_interfaces(&self, pid: u32) -> BTreeMap<String, InterfaceStats> {
        (**self).resolve_interfaces(pid)
    }
}

/// Fills the network section of snapshots from an [`InterfaceResolver`].
#[derive(Debug, Clone, Default)]
pub struct NetworkEnricher<R> {
    resolver: R,
}

impl<R: InterfaceResolver> NetworkEnricher<R> {
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Resolves the interface counters of `pid`, dropping the loopback interface.
    pub fn enrich(&self, pid: u32) -> BTreeMap<String, InterfaceStats> {
        let mut interfaces = self.resolver.resolve_interfaces(pid);
        interfaces.remove(LOOPBACK_INTERFACE);
        interfaces
    }

    /// Replaces the interfaces of `stats` with the counters resolved for `pid`, ordered by
    /// interface name.
    pub fn apply(&self, stats: &mut ContainerStats, pid: u32) {
        stats.network.interfaces = self.enrich(pid).into_values().collect();
    }
}
