//! Creo Stats: normalizes a container engine's streaming stats into canonical,
//! engine-agnostic snapshots, enriched with network counters read from the container's
//! own network namespace.
//!
//! The pipeline lives in [`stats`] and [`netns`]; [`api`] exposes it over HTTP.

pub mod api;
pub mod config;
pub mod container;
pub mod error;
pub mod host;
pub mod netns;
pub mod stats;

use error::ResultOkLogExt;

// The stats stream is expected in the engine's `GET /containers/<id>/stats?stream=true`
// format: one JSON document per line. The pid is the container's init process as seen
// from the host, e.g. `State.Pid` of `GET /containers/<id>/json`.
//
// When running inside a container, mount the host's procfs and point `HOST_PROC` at it,
// otherwise namespace lookups resolve pids of the monitor's own pid namespace.

/// Runs the Creo Stats API server.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the listener cannot be bound.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::Config::from_env()?;
    log::debug!("Configuration: {:?}", config);

    if let Some(total) = host::memory_capacity(&config.proc_root).ok_log(log::Level::Warn) {
        log::debug!("Host memory capacity: {} bytes", total);
    }

    let resolver = netns::ProcfsResolver::new(&config.proc_root);
    let accumulator = stats::Accumulator::new(stats::Normalizer::new(config.normalizer), resolver);
    let server = api::APIServer::new(api::AppState::new(accumulator, &config.proc_root));

    log::info!("Listening on {}", config.listen_addr);
    server.listen(config.listen_addr).await?;
    Ok(())
}
