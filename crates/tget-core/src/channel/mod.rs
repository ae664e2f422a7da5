//! Outbound channels.
//!
//! A channel is one network path (normally one SOCKS proxy) with an HTTP
//! client bound to it. The engine only needs `execute`: send a request and
//! stream the response body into a sink. Implementations must be safe for
//! concurrent requests; the engine issues up to `concurrency_per_channel` of
//! them at once.

mod head;
mod proxied;
pub mod provider;

#[cfg(test)]
pub(crate) mod scripted;

use std::io;

use url::Url;

pub use head::ResponseHead;
pub use proxied::{ChannelOptions, CurlChannel};

/// An HTTP request as issued by a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    /// When set, ask for the bytes from this offset to the end (`Range: bytes=N-`).
    pub range_start: Option<u64>,
}

impl Request {
    /// Plain GET without extra headers.
    pub fn get(url: Url) -> Self {
        Self {
            method: "GET".to_string(),
            url,
            headers: Vec::new(),
            body: None,
            range_start: None,
        }
    }
}

/// Receives a response while it streams in.
///
/// `on_head` is called exactly once, after the final header block and before
/// any body bytes (also for empty bodies). Returning `Ok(false)` discards the
/// body. Any `Err` stops the transfer and `execute` returns
/// [`ChannelError::SinkStopped`]; the sink keeps its own record of why.
pub trait BodySink {
    fn on_head(&mut self, head: &ResponseHead) -> io::Result<bool>;
    fn on_data(&mut self, data: &[u8]) -> io::Result<()>;

    /// Polled while the transfer waits for data; `true` stops it with
    /// [`ChannelError::SinkStopped`].
    fn should_stop(&self) -> bool {
        false
    }
}

/// Sink that ignores the body (readiness probes).
#[derive(Debug, Default)]
pub struct DiscardBody;

impl BodySink for DiscardBody {
    fn on_head(&mut self, _head: &ResponseHead) -> io::Result<bool> {
        Ok(false)
    }

    fn on_data(&mut self, _data: &[u8]) -> io::Result<()> {
        Ok(())
    }
}

/// Failure of a single request on a channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Connection, proxy, TLS or timeout failure.
    #[error("transport: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// The peer answered without a parseable status line.
    #[error("malformed response (no status line)")]
    MalformedResponse,
    /// The body sink asked to stop.
    #[error("transfer stopped by body sink")]
    SinkStopped,
}

/// One outbound network path.
pub trait Channel: Send + Sync {
    /// Short name used in logs and reports (e.g. `socks5h://127.0.0.1:9050`).
    fn label(&self) -> &str;

    /// Sends `request` and streams the response into `sink`. Redirects are
    /// never followed here; the transfer decides what to do with them.
    fn execute(
        &self,
        request: &Request,
        sink: &mut dyn BodySink,
    ) -> Result<ResponseHead, ChannelError>;
}
