//! CLI for tget: download many URLs at once over several Tor instances.

mod progress;
mod settings;
mod targets;
mod tor;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tget_core::channel::provider::{admit_channels, free_ports, proxied_channels};
use tget_core::channel::Channel;
use tget_core::config;
use tget_core::control::CancelToken;
use tget_core::progress::ProgressAggregator;
use tget_core::task::build_tasks;
use tget_core::{Orchestrator, SetupError};

pub use settings::Settings;

/// Top-level CLI for tget.
#[derive(Debug, Parser)]
#[command(name = "tget", version)]
#[command(about = "tget: download files in parallel over multiple Tor circuits", long_about = None)]
pub struct Cli {
    /// URLs to download (or URL list files with --from-file).
    #[arg(required = true, value_name = "URL|FILE")]
    pub targets: Vec<String>,

    /// Treat arguments as files holding one URL per line.
    #[arg(short = 'F', long)]
    pub from_file: bool,

    /// Directory to save downloaded files in (default: current directory).
    #[arg(short = 'o', long, value_name = "DIR")]
    pub out_path: Option<PathBuf>,

    /// Number of Tor instances (channels) to use.
    #[arg(short = 'n', long, value_name = "N")]
    pub instances: Option<usize>,

    /// Concurrent downloads per instance.
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// SOCKS ports for the instances (comma separated or repeated); missing ones are picked automatically.
    #[arg(short = 'p', long, value_delimiter = ',', value_name = "PORT")]
    pub ports: Vec<u16>,

    /// Host the SOCKS proxies listen on.
    #[arg(long)]
    pub host: Option<String>,

    /// SOCKS version to use (socks5, socks5h, socks4, socks4a).
    #[arg(short = 'S', long, value_name = "VERSION")]
    pub socks_version: Option<String>,

    /// Path to the Tor binary.
    #[arg(short = 't', long, value_name = "PATH")]
    pub tor_path: Option<PathBuf>,

    /// torrc template file to use.
    #[arg(short = 'c', long, value_name = "FILE")]
    pub conf: Option<PathBuf>,

    /// Use proxies that are already running instead of starting Tor.
    #[arg(long)]
    pub no_spawn: bool,

    /// URL requested to check that an instance is up.
    #[arg(long, value_name = "URL")]
    pub test_domain: Option<String>,

    /// Max seconds to wait for each instance to come up (0: no timeout).
    #[arg(short = 'T', long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Log file (default: ~/.local/state/tget/tget.log).
    #[arg(short = 'l', long, value_name = "FILE")]
    pub log_path: Option<PathBuf>,

    /// Verbose logging.
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Overwrite files that already exist.
    #[arg(short = 'O', long)]
    pub overwrite: bool,

    /// Continue previously interrupted downloads.
    #[arg(long = "continue")]
    pub resume: bool,

    /// Follow one HTTP redirect per download.
    #[arg(short = 'f', long)]
    pub follow_redirect: bool,

    /// Skip TLS certificate validation.
    #[arg(short = 'k', long)]
    pub unsafe_tls: bool,

    /// Header to include in all requests ("Name: value" or "Name=value"); repeatable.
    #[arg(short = 'H', long = "header", value_name = "HEADER")]
    pub headers: Vec<String>,

    /// Cookie(s) to include in all requests.
    #[arg(short = 'C', long)]
    pub cookies: Option<String>,

    /// Body of the request to send.
    #[arg(short = 'd', long)]
    pub data: Option<String>,

    /// User-Agent to send.
    #[arg(short = 'U', long)]
    pub useragent: Option<String>,

    /// HTTP method to use.
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: String,
}

/// Runs one download session. Returns whether every task completed.
pub async fn run(cli: Cli) -> Result<bool> {
    let cfg = config::load_or_init().context("loading config")?;
    tracing::debug!("loaded config: {:?}", cfg);
    let settings = Settings::resolve(&cli, &cfg)?;

    let urls = targets::collect_urls(&cli.targets, cli.from_file)?;
    if urls.is_empty() {
        return Err(SetupError::EmptyTaskList.into());
    }
    std::fs::create_dir_all(&settings.out_dir)
        .with_context(|| format!("creating {}", settings.out_dir.display()))?;
    let tasks = build_tasks(&urls, &settings.template, &settings.out_dir)?;
    tracing::info!(urls = tasks.len(), out = %settings.out_dir.display(), "tasks ready");

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\ninterrupted, stopping downloads...");
                tracing::warn!("interrupted; cancelling run");
                cancel.cancel();
            }
        });
    }

    let mut ports = settings.ports.clone();
    if ports.len() < settings.instances {
        let missing = settings.instances - ports.len();
        let found = free_ports(missing).context("finding free ports")?;
        tracing::debug!("found free SOCKS ports {:?}", found);
        ports.extend(found);
    }
    ports.truncate(settings.instances);

    // Kept alive until the run ends; dropping it stops the Tor processes.
    let _fleet = if settings.spawn_tor {
        eprintln!("starting {} Tor instance(s)...", ports.len());
        let fleet = tor::TorFleet::launch(&settings.tor, &ports, cli.verbose)?;
        tracing::info!("{} Tor instance(s) launched", fleet.len());
        Some(fleet)
    } else {
        None
    };

    let endpoints: Vec<_> = ports.iter().map(|p| settings.proxy.endpoint(*p)).collect();
    let channels: Vec<Arc<dyn Channel>> = proxied_channels(&endpoints, settings.channel_options)
        .into_iter()
        .map(|c| Arc::new(c) as Arc<dyn Channel>)
        .collect();

    eprintln!("waiting for {} channel(s) to become ready...", channels.len());
    let probe = settings.probe.clone();
    let admit_cancel = cancel.clone();
    let ready = tokio::task::spawn_blocking(move || admit_channels(channels, &probe, &admit_cancel))
        .await
        .context("readiness probe task")??;
    eprintln!("{} channel(s) ready", ready.len());

    let aggregator = Arc::new(ProgressAggregator::new());
    let orchestrator = Orchestrator::new(ready, settings.run_options)?
        .with_progress(Arc::clone(&aggregator))
        .with_cancel(cancel.clone());

    let printer = progress::spawn_printer(Arc::clone(&aggregator));
    let result = tokio::task::spawn_blocking(move || orchestrator.run(tasks))
        .await
        .context("download engine task")?;
    printer.stop().await;

    progress::print_summary(&result);
    Ok(result.all_completed())
}

#[cfg(test)]
mod tests;
