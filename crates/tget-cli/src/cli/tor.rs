//! Launches the Tor instances that back the channels.
//!
//! Each instance gets its own temporary directory holding the rendered torrc
//! and Tor's data directory. Instances are killed when the fleet is dropped.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use tempfile::TempDir;
use tget_core::channel::provider::free_ports;

/// Built-in torrc template.
pub const DEFAULT_TORRC: &str = "\
SocksPort {{SocksPort}}
ControlPort {{ControlPort}}
DataDirectory {{DataDir}}
AvoidDiskWrites 1
";

#[derive(Debug, Clone, Default)]
pub struct TorSettings {
    /// Tor binary; looked up on PATH when `None`.
    pub binary: Option<PathBuf>,
    /// torrc template file; `DEFAULT_TORRC` when `None`.
    pub torrc_template: Option<PathBuf>,
}

impl TorSettings {
    fn binary(&self) -> Result<PathBuf> {
        match &self.binary {
            Some(path) => Ok(path.clone()),
            None => which::which("tor").context("tor binary not found on PATH (use --tor-path)"),
        }
    }

    fn template(&self) -> Result<String> {
        match &self.torrc_template {
            Some(path) => fs::read_to_string(path)
                .with_context(|| format!("failed to read torrc template {}", path.display())),
            None => Ok(DEFAULT_TORRC.to_string()),
        }
    }
}

/// Fills the `{{SocksPort}}`, `{{ControlPort}}` and `{{DataDir}}` placeholders.
pub fn render_torrc(template: &str, socks_port: u16, control_port: u16, data_dir: &Path) -> String {
    template
        .replace("{{SocksPort}}", &socks_port.to_string())
        .replace("{{ControlPort}}", &control_port.to_string())
        .replace("{{DataDir}}", &data_dir.display().to_string())
}

struct TorInstance {
    socks_port: u16,
    child: Child,
    // Removed on drop, after the process is gone.
    _dir: TempDir,
}

/// Running Tor processes, one per SOCKS port.
pub struct TorFleet {
    instances: Vec<TorInstance>,
}

impl TorFleet {
    /// Starts one Tor process per entry of `socks_ports`.
    pub fn launch(settings: &TorSettings, socks_ports: &[u16], verbose: bool) -> Result<Self> {
        let binary = settings.binary()?;
        let template = settings.template()?;
        let control_ports = free_ports(socks_ports.len()).context("finding free control ports")?;
        tracing::info!(tor = %binary.display(), instances = socks_ports.len(), "starting Tor");

        let mut fleet = TorFleet {
            instances: Vec::with_capacity(socks_ports.len()),
        };
        for (&socks_port, &control_port) in socks_ports.iter().zip(&control_ports) {
            let dir = tempfile::Builder::new()
                .prefix("tget_")
                .tempdir()
                .context("creating Tor temp dir")?;
            let data_dir = dir.path().join("data");
            fs::create_dir_all(&data_dir)?;
            let torrc = dir.path().join(format!("{}.torrc", socks_port));
            fs::write(&torrc, render_torrc(&template, socks_port, control_port, &data_dir))
                .with_context(|| format!("writing {}", torrc.display()))?;
            tracing::debug!(path = %torrc.display(), socks_port, control_port, "wrote torrc");

            let (stdout, stderr) = if verbose {
                (Stdio::inherit(), Stdio::inherit())
            } else {
                (Stdio::null(), Stdio::null())
            };
            let child = Command::new(&binary)
                .arg("-f")
                .arg(&torrc)
                .stdin(Stdio::null())
                .stdout(stdout)
                .stderr(stderr)
                .spawn()
                .with_context(|| format!("failed to start {}", binary.display()))?;
            fleet.instances.push(TorInstance {
                socks_port,
                child,
                _dir: dir,
            });
        }
        Ok(fleet)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }
}

impl Drop for TorFleet {
    fn drop(&mut self) {
        for instance in &mut self.instances {
            if let Err(e) = instance.child.kill() {
                tracing::debug!(socks_port = instance.socks_port, "tor already exited: {}", e);
            }
            let _ = instance.child.wait();
        }
        if !self.instances.is_empty() {
            tracing::info!("stopped {} Tor instance(s)", self.instances.len());
        }
    }
}
