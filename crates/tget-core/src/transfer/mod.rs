//! Per-task transfer state machine.
//!
//! A transfer runs on its worker thread, against the single channel its
//! worker belongs to:
//!
//! ```text
//! Init -> ProbeExisting -> Requesting -> RedirectCheck -> Streaming -> Completed
//!                                     \-> Aborted / Failed
//! ```
//!
//! The cancel token is checked at every transition and after every body chunk
//! is written. Whatever happens, the transfer ends in exactly one `Outcome`.

mod error;
mod sink;

use std::fmt;
use std::path::{Path, PathBuf};

use url::Url;

use crate::channel::{Channel, ResponseHead};
use crate::control::CancelToken;
use crate::naming::{base_name_from_url, FilenameResolver, NamePolicy};
use crate::progress::ProgressAggregator;
use crate::storage::existing_len;
use crate::task::{Task, TaskId};

pub use error::TransferError;
use sink::FileSink;

/// Per-run switches that shape every transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferOptions {
    /// Continue partial files with a range request.
    pub resume: bool,
    /// Replace existing files instead of picking a `.N` name.
    pub overwrite: bool,
    /// Follow a single redirect; otherwise a redirect aborts the task.
    pub follow_redirect: bool,
}

impl TransferOptions {
    /// Overwrite and resume both target the name derived from the URL.
    pub fn name_policy(&self) -> NamePolicy {
        if self.overwrite || self.resume {
            NamePolicy::Reuse
        } else {
            NamePolicy::Unique
        }
    }
}

/// Why a task stopped without completing or failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// Redirect received and following is disabled.
    Redirect,
    /// The followed redirect led to another redirect.
    RedirectChain,
    /// The redirect had no usable `Location`.
    BadRedirectLocation(String),
    /// The run was cancelled.
    Cancelled,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Redirect => f.write_str("redirect"),
            AbortReason::RedirectChain => f.write_str("redirect chain"),
            AbortReason::BadRedirectLocation(why) => write!(f, "bad redirect location: {}", why),
            AbortReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Terminal result of one task.
#[derive(Debug)]
pub enum Outcome {
    Completed,
    Aborted(AbortReason),
    Failed(TransferError),
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Completed => f.write_str("completed"),
            Outcome::Aborted(reason) => write!(f, "aborted ({})", reason),
            Outcome::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

/// What the engine reports for one task.
#[derive(Debug)]
pub struct TaskReport {
    pub id: TaskId,
    pub url: String,
    /// Label of the channel the task ran on.
    pub channel: String,
    /// Output path, once one was chosen.
    pub output: Option<PathBuf>,
    /// Size of the output file when the transfer ended.
    pub bytes_on_disk: u64,
    /// Expected size, when the server said.
    pub total: Option<u64>,
    pub outcome: Outcome,
}

impl TaskReport {
    /// Report for a task that never ran a transfer (cancelled in the queue, worker panic).
    pub fn without_transfer(task: &Task, channel: &str, outcome: Outcome) -> Self {
        Self {
            id: task.id(),
            url: task.url().to_string(),
            channel: channel.to_string(),
            output: None,
            bytes_on_disk: 0,
            total: None,
            outcome,
        }
    }
}

/// Everything a transfer borrows from its worker.
pub struct TransferContext<'a> {
    pub channel: &'a dyn Channel,
    pub resolver: &'a FilenameResolver,
    pub progress: &'a ProgressAggregator,
    pub cancel: &'a CancelToken,
    pub options: TransferOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Init,
    ProbeExisting,
    Requesting,
    RedirectCheck,
}

struct TransferState<'t> {
    task: &'t Task,
    channel: String,
    phase: Phase,
    output: Option<PathBuf>,
}

impl<'t> TransferState<'t> {
    fn new(task: &'t Task, channel: &str) -> Self {
        Self {
            task,
            channel: channel.to_string(),
            phase: Phase::Init,
            output: None,
        }
    }

    /// Moves to `phase`; `false` when the run was cancelled meanwhile.
    fn enter(&mut self, phase: Phase, cancel: &CancelToken) -> bool {
        self.phase = phase;
        tracing::debug!(task = %self.task.id(), channel = %self.channel, phase = ?phase, "transfer phase");
        !cancel.is_cancelled()
    }

    fn drive(&mut self, ctx: &TransferContext<'_>) -> Outcome {
        let cancelled = Outcome::Aborted(AbortReason::Cancelled);
        let id = self.task.id();

        if !self.enter(Phase::Init, ctx.cancel) {
            return cancelled;
        }
        let candidate = base_name_from_url(self.task.url());
        let path = ctx.resolver.resolve(self.task.target_dir(), &candidate);
        self.output = Some(path.clone());

        if !self.enter(Phase::ProbeExisting, ctx.cancel) {
            return cancelled;
        }
        let resume_offset = match probe_existing(&path, ctx.options) {
            Ok(offset) => offset,
            Err(e) => return Outcome::Failed(e),
        };
        if resume_offset > 0 {
            tracing::info!(task = %id, path = %path.display(), offset = resume_offset, "resuming");
        }

        if !self.enter(Phase::Requesting, ctx.cancel) {
            return cancelled;
        }
        let mut request = self.task.request();
        request.range_start = (resume_offset > 0).then_some(resume_offset);
        let head_only = request.method == "HEAD";
        let mut sink = FileSink::new(id, &path, resume_offset, ctx.progress, ctx.cancel)
            .head_only(head_only);
        let result = ctx.channel.execute(&request, &mut sink);
        let head = match result {
            Ok(head) if sink.saw_redirect() => head,
            other => return sink.conclude(other, &self.channel),
        };

        if !self.enter(Phase::RedirectCheck, ctx.cancel) {
            return cancelled;
        }
        if !ctx.options.follow_redirect {
            tracing::info!(task = %id, status = head.status, "redirect not followed");
            return Outcome::Aborted(AbortReason::Redirect);
        }
        let target = match redirect_target(&request.url, &head) {
            Ok(target) => target,
            Err(why) => return Outcome::Aborted(AbortReason::BadRedirectLocation(why)),
        };
        tracing::debug!(task = %id, target = %target, "following redirect");
        request.url = target;

        let mut sink = FileSink::new(id, &path, resume_offset, ctx.progress, ctx.cancel)
            .head_only(head_only);
        let result = ctx.channel.execute(&request, &mut sink);
        if result.is_ok() && sink.saw_redirect() {
            return Outcome::Aborted(AbortReason::RedirectChain);
        }
        sink.conclude(result, &self.channel)
    }

    fn into_report(self, outcome: Outcome, progress: &ProgressAggregator) -> TaskReport {
        let bytes_on_disk = self
            .output
            .as_deref()
            .and_then(|p| existing_len(p).ok().flatten())
            .unwrap_or(0);
        let total = progress.get(self.task.id()).and_then(|p| p.total);
        match &outcome {
            Outcome::Completed => {}
            other => tracing::warn!(
                task = %self.task.id(),
                url = %self.task.url(),
                phase = ?self.phase,
                "{}",
                other
            ),
        }
        TaskReport {
            id: self.task.id(),
            url: self.task.url().to_string(),
            channel: self.channel,
            output: self.output,
            bytes_on_disk,
            total,
            outcome,
        }
    }
}

/// Resume offset for `path`: its current size when resuming, otherwise 0.
fn probe_existing(path: &Path, options: TransferOptions) -> Result<u64, TransferError> {
    if !options.resume || options.overwrite {
        return Ok(0);
    }
    let len = existing_len(path).map_err(|e| TransferError::io("stat", path, e))?;
    Ok(len.unwrap_or(0))
}

/// Absolute http(s) URL named by the redirect's `Location`, relative to `base`.
fn redirect_target(base: &Url, head: &ResponseHead) -> Result<Url, String> {
    let location = head
        .location()
        .ok_or_else(|| "missing Location header".to_string())?;
    let target = base
        .join(location)
        .map_err(|e| format!("{:?}: {}", location, e))?;
    match target.scheme() {
        "http" | "https" => Ok(target),
        other => Err(format!("unsupported scheme {:?}", other)),
    }
}

/// Runs one task to its terminal outcome and reports it.
pub fn run_transfer(task: &Task, ctx: &TransferContext<'_>) -> TaskReport {
    ctx.progress
        .begin(task.id(), &base_name_from_url(task.url()));
    let mut state = TransferState::new(task, ctx.channel.label());
    let outcome = state.drive(ctx);
    state.into_report(outcome, ctx.progress)
}
