//! Effective run settings: config file values overridden by command-line flags.

use anyhow::{bail, Result};
use std::path::PathBuf;
use tget_core::channel::provider::ReadinessProbe;
use tget_core::channel::ChannelOptions;
use tget_core::config::{ProxyConfig, TgetConfig};
use tget_core::task::parse_header_arg;
use tget_core::{RequestTemplate, RunOptions, TransferOptions};

use super::tor::TorSettings;
use super::Cli;

/// SOCKS port assumed when proxies are not spawned and none is given.
const DEFAULT_SOCKS_PORT: u16 = 9050;

#[derive(Debug, Clone)]
pub struct Settings {
    pub instances: usize,
    /// Ports given explicitly; the rest are discovered when spawning.
    pub ports: Vec<u16>,
    pub proxy: ProxyConfig,
    pub spawn_tor: bool,
    pub tor: TorSettings,
    pub probe: ReadinessProbe,
    pub channel_options: ChannelOptions,
    pub run_options: RunOptions,
    pub template: RequestTemplate,
    pub out_dir: PathBuf,
}

/// Maps a `--socks-version` value to a libcurl proxy scheme.
///
/// Plain `socks5`/`socks4` become the variants that resolve host names on the
/// proxy side, so DNS lookups go through Tor as well.
pub fn proxy_scheme(version: &str) -> Result<String> {
    let v = version.trim().to_ascii_lowercase();
    let scheme = match v.as_str() {
        "5" | "socks5" | "socks5h" => "socks5h",
        "4" | "socks4" | "socks4a" => "socks4a",
        _ => bail!("unsupported SOCKS version {:?}", version),
    };
    Ok(scheme.to_string())
}

fn default_user_agent() -> String {
    format!("tget/{}", env!("CARGO_PKG_VERSION"))
}

impl Settings {
    pub fn resolve(cli: &Cli, cfg: &TgetConfig) -> Result<Self> {
        let spawn_tor = !cli.no_spawn;
        let mut ports = if cli.ports.is_empty() {
            cfg.proxy.ports.clone()
        } else {
            cli.ports.clone()
        };

        let mut instances = cli.instances.unwrap_or(cfg.instances);
        if instances < 1 {
            tracing::warn!("at least one instance is needed, instances set to 1");
            instances = 1;
        }
        if !spawn_tor {
            if ports.is_empty() {
                ports.push(DEFAULT_SOCKS_PORT);
            }
            instances = ports.len();
        }

        let mut proxy = cfg.proxy.clone();
        if let Some(v) = &cli.socks_version {
            proxy.scheme = proxy_scheme(v)?;
        }
        if let Some(host) = &cli.host {
            proxy.host = host.clone();
        }

        let tor = TorSettings {
            binary: cli.tor_path.clone().or_else(|| cfg.proxy.tor_path.clone()),
            torrc_template: cli.conf.clone().or_else(|| cfg.proxy.torrc_template.clone()),
        };

        let mut readiness = cfg.readiness.clone();
        if let Some(url) = &cli.test_domain {
            readiness.test_url = url.clone();
        }
        if let Some(secs) = cli.timeout {
            readiness.timeout_secs = secs;
        }
        let probe = readiness.probe()?;

        let mut headers = Vec::with_capacity(cli.headers.len());
        for raw in &cli.headers {
            match parse_header_arg(raw) {
                Some(h) => headers.push(h),
                None => bail!("invalid header {:?}: expected \"Name: value\"", raw),
            }
        }
        let template = RequestTemplate {
            method: cli.method.clone(),
            headers,
            cookies: cli.cookies.clone(),
            body: cli.data.as_ref().map(|d| d.as_bytes().to_vec()),
            user_agent: Some(
                cli.useragent
                    .clone()
                    .or_else(|| cfg.http.user_agent.clone())
                    .unwrap_or_else(default_user_agent),
            ),
        };

        if cli.overwrite && cli.resume {
            tracing::warn!("--overwrite and --continue both given; existing files are overwritten");
        }
        let run_options = RunOptions {
            concurrency_per_channel: cli.concurrency.unwrap_or(cfg.concurrency).max(1),
            transfer: TransferOptions {
                resume: cli.resume,
                overwrite: cli.overwrite,
                follow_redirect: cli.follow_redirect,
            },
        };

        let out_dir = match &cli.out_path {
            Some(p) => p.clone(),
            None => std::env::current_dir()?,
        };

        Ok(Self {
            instances,
            ports,
            proxy,
            spawn_tor,
            tor,
            probe,
            channel_options: cfg.http.channel_options(cli.unsafe_tls),
            run_options,
            template,
            out_dir,
        })
    }
}
