use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::channel::provider::{ProxyEndpoint, ReadinessProbe};
use crate::channel::ChannelOptions;

/// Where the SOCKS proxies live and how Tor instances are launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Proxy scheme for libcurl; `socks5h` resolves names through the proxy.
    pub scheme: String,
    /// Host the proxies listen on.
    pub host: String,
    /// Fixed SOCKS ports; missing ones are discovered at startup.
    pub ports: Vec<u16>,
    /// Tor binary; looked up on `PATH` when unset.
    pub tor_path: Option<PathBuf>,
    /// Custom torrc template; the built-in one is used when unset.
    pub torrc_template: Option<PathBuf>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            scheme: "socks5h".to_string(),
            host: "127.0.0.1".to_string(),
            ports: Vec::new(),
            tor_path: None,
            torrc_template: None,
        }
    }
}

impl ProxyConfig {
    pub fn endpoint(&self, port: u16) -> ProxyEndpoint {
        ProxyEndpoint {
            scheme: self.scheme.clone(),
            host: self.host.clone(),
            port,
        }
    }
}

/// Readiness probe settings (a channel joins once a probe request succeeds).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    pub test_url: String,
    pub poll_interval_secs: u64,
    /// 0 = wait forever.
    pub timeout_secs: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            test_url: "https://check.torproject.org/".to_string(),
            poll_interval_secs: 3,
            timeout_secs: 0,
        }
    }
}

impl ReadinessConfig {
    pub fn probe(&self) -> Result<ReadinessProbe> {
        let url = url::Url::parse(&self.test_url)
            .with_context(|| format!("invalid readiness test URL {:?}", self.test_url))?;
        Ok(ReadinessProbe {
            url,
            interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            deadline: (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)),
        })
    }
}

/// Per-request transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub connect_timeout_secs: u64,
    /// Abort a transfer slower than this many bytes/s for `low_speed_time_secs`.
    pub low_speed_limit: u32,
    pub low_speed_time_secs: u64,
    /// Default User-Agent; `None` uses `tget/<version>`.
    pub user_agent: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            low_speed_limit: 1024,
            low_speed_time_secs: 60,
            user_agent: None,
        }
    }
}

impl HttpConfig {
    pub fn channel_options(&self, insecure_tls: bool) -> ChannelOptions {
        ChannelOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            low_speed_limit: self.low_speed_limit,
            low_speed_time: Duration::from_secs(self.low_speed_time_secs),
            insecure_tls,
        }
    }
}

/// Global configuration loaded from `~/.config/tget/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TgetConfig {
    /// Number of channels (Tor instances) to use.
    pub instances: usize,
    /// Concurrent transfers per channel.
    pub concurrency: usize,
    pub proxy: ProxyConfig,
    pub readiness: ReadinessConfig,
    pub http: HttpConfig,
}

impl Default for TgetConfig {
    fn default() -> Self {
        Self {
            instances: 5,
            concurrency: 10,
            proxy: ProxyConfig::default(),
            readiness: ReadinessConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("tget")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from `path`, creating it with defaults if it does not exist.
pub fn load_or_init_at(path: &Path) -> Result<TgetConfig> {
    if !path.exists() {
        let default_cfg = TgetConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml).with_context(|| format!("writing {}", path.display()))?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let cfg: TgetConfig =
        toml::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
    Ok(cfg)
}

/// Load configuration from the XDG config dir, creating a default file if none exists.
pub fn load_or_init() -> Result<TgetConfig> {
    load_or_init_at(&config_path()?)
}
