//! Channel provider: builds proxied channels and admits them once ready.
//!
//! A freshly started proxy (e.g. a Tor instance still bootstrapping) refuses
//! or stalls connections for a while. Each channel is probed with a small
//! request until one succeeds at transport level; only then does it join the
//! rotation.

use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use url::Url;

use super::{Channel, ChannelOptions, CurlChannel, DiscardBody, Request};
use crate::control::CancelToken;
use crate::orchestrator::SetupError;

/// Address of one SOCKS proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    /// Proxy scheme understood by libcurl (`socks5h`, `socks5`, `socks4a`, ...).
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl ProxyEndpoint {
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// One curl channel per endpoint, in endpoint order.
pub fn proxied_channels(endpoints: &[ProxyEndpoint], options: ChannelOptions) -> Vec<CurlChannel> {
    endpoints
        .iter()
        .map(|e| CurlChannel::proxied(e.url(), options))
        .collect()
}

/// How to decide that a channel is usable.
#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    pub url: Url,
    /// Pause between failed attempts.
    pub interval: Duration,
    /// Give up after this long; `None` waits until cancelled.
    pub deadline: Option<Duration>,
}

/// Probes `channel` until a request completes (any HTTP status counts).
/// Returns the number of attempts made.
pub fn wait_ready(
    channel: &dyn Channel,
    probe: &ReadinessProbe,
    cancel: &CancelToken,
) -> Result<u32, SetupError> {
    let started = Instant::now();
    let mut attempts = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(SetupError::Cancelled);
        }
        attempts += 1;
        let request = Request::get(probe.url.clone());
        match channel.execute(&request, &mut DiscardBody) {
            Ok(head) => {
                tracing::debug!(channel = channel.label(), attempts, status = head.status, "channel ready");
                return Ok(attempts);
            }
            Err(e) => {
                tracing::debug!(channel = channel.label(), attempts, "readiness probe failed: {}", e);
            }
        }

        let pause = match probe.deadline {
            Some(limit) => {
                let elapsed = started.elapsed();
                if elapsed >= limit {
                    return Err(SetupError::ChannelNotReady {
                        label: channel.label().to_string(),
                        attempts,
                    });
                }
                probe.interval.min(limit - elapsed)
            }
            None => probe.interval,
        };
        thread::sleep(pause);
    }
}

/// Probes all channels in parallel and returns the ready ones, in input order.
///
/// Channels that miss the deadline are dropped with a warning. Fails when
/// none is ready or the wait was cancelled.
pub fn admit_channels(
    channels: Vec<Arc<dyn Channel>>,
    probe: &ReadinessProbe,
    cancel: &CancelToken,
) -> Result<Vec<Arc<dyn Channel>>, SetupError> {
    let handles: Vec<_> = channels
        .into_iter()
        .map(|channel| {
            let probe = probe.clone();
            let cancel = cancel.clone();
            thread::spawn(move || {
                let res = wait_ready(channel.as_ref(), &probe, &cancel);
                (channel, res)
            })
        })
        .collect();

    let mut ready = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.join() {
            Ok((channel, Ok(_))) => ready.push(channel),
            Ok((_, Err(SetupError::Cancelled))) => return Err(SetupError::Cancelled),
            Ok((channel, Err(e))) => {
                tracing::warn!(channel = channel.label(), "channel left out: {}", e);
            }
            Err(_) => tracing::warn!("readiness probe thread panicked"),
        }
    }

    if ready.is_empty() {
        return Err(SetupError::NoChannels);
    }
    tracing::info!("{} channel(s) ready", ready.len());
    Ok(ready)
}

/// Finds `n` distinct free TCP ports on localhost.
///
/// All listeners are held until every port is found so the same port is
/// never returned twice; another process may still grab one afterwards.
pub fn free_ports(n: usize) -> std::io::Result<Vec<u16>> {
    let listeners = (0..n)
        .map(|_| TcpListener::bind("127.0.0.1:0"))
        .collect::<std::io::Result<Vec<_>>>()?;
    listeners
        .iter()
        .map(|l| l.local_addr().map(|a| a.port()))
        .collect()
}
