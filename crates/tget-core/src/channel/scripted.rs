//! In-memory channel for unit tests: canned responses per URL, request log,
//! and a high-water mark of concurrent requests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{BodySink, Channel, ChannelError, Request, ResponseHead};

#[derive(Debug, Clone)]
pub(crate) enum Script {
    /// Serve `body`; honours `range_start` with 206 when `ranges` is true.
    Body { body: Vec<u8>, ranges: bool },
    Redirect(String),
    Status(u32),
    /// Transport failure before any header.
    Unreachable,
    /// Headers promise `body.len() + missing` bytes, then the connection drops.
    Truncated { body: Vec<u8>, missing: u64 },
    /// 200 without `Content-Length`; the chunks are delivered as given.
    Unsized(Vec<Vec<u8>>),
    /// Sends `sent`, then waits for the sink to ask for a stop (or gives up
    /// after a few seconds with a transport error).
    Stalled { sent: Vec<u8>, declared: u64 },
}

pub(crate) struct ScriptedChannel {
    label: String,
    scripts: HashMap<String, Script>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    failures_left: AtomicUsize,
    pub(crate) requests: Mutex<Vec<Request>>,
}

impl ScriptedChannel {
    pub(crate) fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            scripts: HashMap::new(),
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn serve(mut self, url: &str, script: Script) -> Self {
        self.scripts.insert(url.to_string(), script);
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// The first `n` requests fail at transport level.
    pub(crate) fn failing_first(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    pub(crate) fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub(crate) fn request_log(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    fn respond(
        &self,
        request: &Request,
        sink: &mut dyn BodySink,
    ) -> Result<ResponseHead, ChannelError> {
        let unreachable =
            || ChannelError::Transport("scripted: connection refused".to_string().into());
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(unreachable());
        }
        let script = self
            .scripts
            .get(request.url.as_str())
            .cloned()
            .unwrap_or(Script::Status(404));

        let mut pieces: Option<Vec<Vec<u8>>> = None;
        let mut stall = false;
        let (head, body, cut_short) = match script {
            Script::Unreachable => return Err(unreachable()),
            Script::Status(code) => (ResponseHead::new(code), Vec::new(), false),
            Script::Redirect(location) => (
                ResponseHead::new(302).with_header("Location", &location),
                Vec::new(),
                false,
            ),
            Script::Body { body, ranges } => match request.range_start {
                Some(start) if ranges && start as usize >= body.len() => {
                    (ResponseHead::new(416), Vec::new(), false)
                }
                Some(start) if ranges => {
                    let part = body[start as usize..].to_vec();
                    let head = ResponseHead::new(206)
                        .with_header("Content-Length", &part.len().to_string());
                    (head, part, false)
                }
                _ => {
                    let head = ResponseHead::new(200)
                        .with_header("Content-Length", &body.len().to_string());
                    (head, body, false)
                }
            },
            Script::Truncated { body, missing } => {
                let declared = body.len() as u64 + missing;
                let head = ResponseHead::new(200)
                    .with_header("Content-Length", &declared.to_string());
                (head, body, true)
            }
            Script::Unsized(chunks) => {
                pieces = Some(chunks);
                (ResponseHead::new(200), Vec::new(), false)
            }
            Script::Stalled { sent, declared } => {
                stall = true;
                let head = ResponseHead::new(200)
                    .with_header("Content-Length", &declared.to_string());
                (head, sent, false)
            }
        };

        let wants_body = sink
            .on_head(&head)
            .map_err(|_| ChannelError::SinkStopped)?;
        let wants_body = wants_body && request.method != "HEAD";
        if wants_body {
            let pieces = pieces.unwrap_or_else(|| body.chunks(7).map(<[u8]>::to_vec).collect());
            for piece in &pieces {
                if !self.delay.is_zero() {
                    std::thread::sleep(self.delay / 4);
                }
                sink.on_data(piece).map_err(|_| ChannelError::SinkStopped)?;
            }
        }
        if stall {
            for _ in 0..500 {
                if sink.should_stop() {
                    return Err(ChannelError::SinkStopped);
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            return Err(ChannelError::Transport(
                "scripted: stalled transfer timed out".to_string().into(),
            ));
        }
        if cut_short {
            return Err(ChannelError::Transport(
                "scripted: connection reset mid-body".to_string().into(),
            ));
        }
        Ok(head)
    }
}

impl Channel for ScriptedChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn execute(
        &self,
        request: &Request,
        sink: &mut dyn BodySink,
    ) -> Result<ResponseHead, ChannelError> {
        self.requests.lock().unwrap().push(request.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let result = self.respond(request, sink);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
