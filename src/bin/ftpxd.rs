use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use ftpx::cli::DaemonOpts;
use ftpx::config::ServerConfig;
use ftpx::logging;
use ftpx::net_async::server::Server;

fn main() -> Result<()> {
    let opts = DaemonOpts::parse();
    logging::init("info");

    let config = ServerConfig::try_from(&opts).context("Invalid daemon configuration")?;

    // The root may be created on first upload, but it must not be a file
    if config.root.exists() && !config.root.is_dir() {
        anyhow::bail!("Root path is not a directory: {}", config.root.display());
    }

    info!("Starting ftpx daemon:");
    info!("  Root: {}", config.root.display());
    info!("  Bind: {}", config.bind);
    info!("  I/O timeout: {:?}", config.io_timeout);

    if config.bind.starts_with("0.0.0.0") {
        warn!("Binding to 0.0.0.0 exposes the daemon to all network interfaces");
        warn!("The protocol is UNENCRYPTED and UNAUTHENTICATED - only use on trusted networks");
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    rt.block_on(async move {
        let bind = config.bind.clone();
        let server = Server::bind(config)
            .await
            .with_context(|| format!("Failed to bind {}", bind))?;
        server
            .run_until(async {
                if tokio::signal::ctrl_c().await.is_err() {
                    // No signal support: run until the listener fails
                    std::future::pending::<()>().await;
                }
            })
            .await
            .context("Listener failed")?;
        info!("ftpx daemon stopped");
        Ok::<(), anyhow::Error>(())
    })
}
