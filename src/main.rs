//! ftpx client
//!
//! One short-lived connection per operation; upload and download batches run
//! concurrently, bounded by `--jobs`.

use anyhow::{Context, Result};
use clap::Parser;

use ftpx::cli::{ClientOpts, Command};
use ftpx::config::ClientConfig;
use ftpx::logging;
use ftpx::net_async::client::{self, BatchReport};

fn main() -> Result<()> {
    let opts = ClientOpts::parse();
    logging::init("warn");

    let config = ClientConfig::try_from(&opts).context("Invalid client configuration")?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    rt.block_on(run(opts.command, config))
}

async fn run(command: Command, config: ClientConfig) -> Result<()> {
    match command {
        Command::Upload { paths } => {
            let report = client::upload_many(&config, &paths).await?;
            finish_batch("uploaded", &report)
        }
        Command::Download { paths } => {
            let report = client::download_many(&config, &paths).await?;
            finish_batch("downloaded", &report)
        }
        Command::Show => {
            let names = client::show(&config)
                .await
                .with_context(|| format!("Failed to list files on {}", config.server))?;
            for name in names {
                println!("{}", name);
            }
            Ok(())
        }
        Command::Search { names } => {
            let results = client::search(&config, &names)
                .await
                .with_context(|| format!("Failed to search on {}", config.server))?;
            for (name, path) in results.iter() {
                println!("{} : {}", name, path);
            }
            Ok(())
        }
    }
}

fn finish_batch(verb: &str, report: &BatchReport) -> Result<()> {
    for (item, bytes) in &report.succeeded {
        println!("{} {} ({} bytes)", verb, item, bytes);
    }
    if !report.is_success() {
        for (item, e) in &report.failed {
            eprintln!("failed: {}: {}", item, e);
        }
        anyhow::bail!(
            "{} of {} files failed",
            report.failed.len(),
            report.failed.len() + report.succeeded.len()
        );
    }
    Ok(())
}
