/// Entry point for the Creo Stats service.
///
/// Serves the stats normalization API. Configuration is read from environment variables,
/// see [`creo_stats::config`].
///
/// # Examples
///
/// ```bash
/// RUST_LOG=debug HOST_PROC=/rootfs/proc cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    creo_stats::run().await
}
