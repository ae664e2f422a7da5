//! libcurl channel bound to one proxy.
//!
//! Each `execute` builds its own easy handle, so one `CurlChannel` can serve
//! many concurrent requests from the worker pool.

use std::cell::RefCell;
use std::str;
use std::time::Duration;

use curl::easy::{Easy, List};

use super::{BodySink, Channel, ChannelError, Request, ResponseHead};

/// Transport settings shared by every request on a channel.
#[derive(Debug, Clone, Copy)]
pub struct ChannelOptions {
    pub connect_timeout: Duration,
    /// Abort when throughput stays below `low_speed_limit` bytes/s for `low_speed_time`.
    pub low_speed_limit: u32,
    pub low_speed_time: Duration,
    /// Skip TLS certificate and host verification.
    pub insecure_tls: bool,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            low_speed_limit: 1024,
            low_speed_time: Duration::from_secs(60),
            insecure_tls: false,
        }
    }
}

/// HTTP client that sends every request through `proxy` (or directly when `None`).
#[derive(Debug, Clone)]
pub struct CurlChannel {
    label: String,
    proxy: Option<String>,
    options: ChannelOptions,
}

impl CurlChannel {
    /// Channel tunnelling through `proxy_url` (e.g. `socks5h://127.0.0.1:9050`).
    pub fn proxied(proxy_url: impl Into<String>, options: ChannelOptions) -> Self {
        let proxy = proxy_url.into();
        Self {
            label: proxy.clone(),
            proxy: Some(proxy),
            options,
        }
    }

    /// Channel without a proxy.
    pub fn direct(label: impl Into<String>, options: ChannelOptions) -> Self {
        Self {
            label: label.into(),
            proxy: None,
            options,
        }
    }

    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    fn configure(&self, easy: &mut Easy, request: &Request) -> Result<(), curl::Error> {
        easy.url(request.url.as_str())?;
        if let Some(proxy) = &self.proxy {
            easy.proxy(proxy)?;
        }
        easy.follow_location(false)?;
        easy.connect_timeout(self.options.connect_timeout)?;
        easy.low_speed_limit(self.options.low_speed_limit)?;
        easy.low_speed_time(self.options.low_speed_time)?;
        easy.progress(true)?;
        if self.options.insecure_tls {
            easy.ssl_verify_peer(false)?;
            easy.ssl_verify_host(false)?;
        }

        let method = request.method.as_str();
        match (&request.body, method) {
            (Some(body), _) => {
                easy.post_fields_copy(body)?;
                if method != "POST" {
                    easy.custom_request(method)?;
                }
            }
            (None, "GET") => easy.get(true)?,
            (None, "HEAD") => easy.nobody(true)?,
            (None, other) => easy.custom_request(other)?,
        }

        if let Some(start) = request.range_start {
            easy.range(&format!("{}-", start))?;
        }

        if !request.headers.is_empty() {
            let mut list = List::new();
            for (k, v) in &request.headers {
                list.append(&format!("{}: {}", k.trim(), v.trim()))?;
            }
            easy.http_headers(list)?;
        }
        Ok(())
    }
}

/// Hands the head to the sink once, then forwards body bytes while the sink wants them.
struct Delivery<'s> {
    sink: &'s mut dyn BodySink,
    head: Option<ResponseHead>,
    wants_body: bool,
    failure: Option<ChannelError>,
}

impl Delivery<'_> {
    fn begin(&mut self, lines: &[String]) -> Result<(), ChannelError> {
        let head = ResponseHead::parse(lines).ok_or(ChannelError::MalformedResponse)?;
        self.wants_body = self
            .sink
            .on_head(&head)
            .map_err(|_| ChannelError::SinkStopped)?;
        self.head = Some(head);
        Ok(())
    }

    /// Returns false to make libcurl abort the transfer.
    fn data(&mut self, lines: &[String], data: &[u8]) -> bool {
        if self.head.is_none() {
            if let Err(e) = self.begin(lines) {
                self.failure = Some(e);
                return false;
            }
        }
        if !self.wants_body || data.is_empty() {
            return true;
        }
        if self.sink.on_data(data).is_err() {
            self.failure = Some(ChannelError::SinkStopped);
            return false;
        }
        true
    }
}

fn transport(e: curl::Error) -> ChannelError {
    ChannelError::Transport(Box::new(e))
}

impl Channel for CurlChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn execute(
        &self,
        request: &Request,
        sink: &mut dyn BodySink,
    ) -> Result<ResponseHead, ChannelError> {
        let mut easy = Easy::new();
        self.configure(&mut easy, request).map_err(transport)?;

        let lines: RefCell<Vec<String>> = RefCell::new(Vec::new());
        let delivery = RefCell::new(Delivery {
            sink,
            head: None,
            wants_body: false,
            failure: None,
        });

        let performed = {
            let mut transfer = easy.transfer();
            transfer
                .header_function(|data| {
                    if let Ok(s) = str::from_utf8(data) {
                        lines.borrow_mut().push(s.trim_end().to_string());
                    }
                    true
                })
                .map_err(transport)?;
            transfer
                .write_function(|data| {
                    if delivery.borrow_mut().data(&lines.borrow(), data) {
                        Ok(data.len())
                    } else {
                        Ok(0)
                    }
                })
                .map_err(transport)?;
            // Called about once a second even when no data arrives.
            transfer
                .progress_function(|_, _, _, _| {
                    let mut delivery = delivery.borrow_mut();
                    if delivery.sink.should_stop() {
                        delivery.failure = Some(ChannelError::SinkStopped);
                        return false;
                    }
                    true
                })
                .map_err(transport)?;
            transfer.perform()
        };

        let mut delivery = delivery.into_inner();
        if let Err(e) = performed {
            if let Some(failure) = delivery.failure.take() {
                return Err(failure);
            }
            return Err(transport(e));
        }

        if delivery.head.is_none() {
            delivery.begin(&lines.borrow())?;
        }
        delivery.head.ok_or(ChannelError::MalformedResponse)
    }
}
