//! Body sink that decides, from the response head, whether to stream into
//! the output file, and then appends each chunk as it arrives.

use std::io;
use std::path::Path;

use crate::channel::{BodySink, ChannelError, ResponseHead};
use crate::control::CancelToken;
use crate::progress::ProgressAggregator;
use crate::storage::{OutputFile, WriteStart};
use crate::task::TaskId;

use super::{AbortReason, Outcome, TransferError};

/// What the head told us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Pending,
    Redirect,
    /// 416 on a resumed request: the file already holds everything.
    AlreadyComplete,
    Status(u32),
    /// HEAD request: nothing to write.
    HeadersOnly,
    Streaming,
}

pub(super) struct FileSink<'a> {
    task: TaskId,
    path: &'a Path,
    resume_offset: u64,
    progress: &'a ProgressAggregator,
    cancel: &'a CancelToken,
    verdict: Verdict,
    out: Option<OutputFile>,
    total: Option<u64>,
    failure: Option<TransferError>,
    cancelled: bool,
    head_only: bool,
}

fn stop() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "transfer stopped")
}

impl<'a> FileSink<'a> {
    pub(super) fn new(
        task: TaskId,
        path: &'a Path,
        resume_offset: u64,
        progress: &'a ProgressAggregator,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            task,
            path,
            resume_offset,
            progress,
            cancel,
            verdict: Verdict::Pending,
            out: None,
            total: None,
            failure: None,
            cancelled: false,
            head_only: false,
        }
    }

    /// The request asks for headers only; the output file is never opened.
    pub(super) fn head_only(mut self, on: bool) -> Self {
        self.head_only = on;
        self
    }

    pub(super) fn saw_redirect(&self) -> bool {
        self.verdict == Verdict::Redirect
    }

    fn fail_io(&mut self, context: &'static str, e: io::Error) -> io::Error {
        self.failure = Some(TransferError::io(context, self.path, e));
        stop()
    }

    fn check_cancel(&mut self) -> io::Result<()> {
        if self.cancel.is_cancelled() {
            self.cancelled = true;
            return Err(stop());
        }
        Ok(())
    }

    /// Turns the channel result into the task's outcome.
    pub(super) fn conclude(
        mut self,
        result: Result<ResponseHead, ChannelError>,
        channel: &str,
    ) -> Outcome {
        if let Err(e) = result {
            if self.cancelled || self.cancel.is_cancelled() {
                return Outcome::Aborted(AbortReason::Cancelled);
            }
            if let Some(failure) = self.failure.take() {
                return Outcome::Failed(failure);
            }
            return Outcome::Failed(TransferError::Channel {
                channel: channel.to_string(),
                source: e,
            });
        }

        match self.verdict {
            Verdict::AlreadyComplete => {
                tracing::info!(task = %self.task, path = %self.path.display(), "already complete");
                Outcome::Completed
            }
            Verdict::Status(code) => Outcome::Failed(TransferError::HttpStatus(code)),
            Verdict::Redirect => Outcome::Aborted(AbortReason::Redirect),
            Verdict::HeadersOnly => {
                tracing::info!(task = %self.task, "headers received; nothing written");
                Outcome::Completed
            }
            Verdict::Pending => Outcome::Failed(TransferError::Channel {
                channel: channel.to_string(),
                source: ChannelError::MalformedResponse,
            }),
            Verdict::Streaming => {
                let Some(out) = self.out.take() else {
                    return Outcome::Failed(TransferError::Channel {
                        channel: channel.to_string(),
                        source: ChannelError::MalformedResponse,
                    });
                };
                if let Err(e) = out.sync() {
                    return Outcome::Failed(TransferError::io("sync", self.path, e));
                }
                if let Some(expected) = self.total {
                    if out.offset() < expected {
                        return Outcome::Failed(TransferError::ShortBody {
                            expected,
                            received: out.offset(),
                        });
                    }
                }
                tracing::info!(
                    task = %self.task,
                    path = %self.path.display(),
                    bytes = out.offset(),
                    "download complete"
                );
                Outcome::Completed
            }
        }
    }
}

impl BodySink for FileSink<'_> {
    fn on_head(&mut self, head: &ResponseHead) -> io::Result<bool> {
        if head.is_redirect() {
            self.verdict = Verdict::Redirect;
            return Ok(false);
        }
        if self.resume_offset > 0 && head.status == 416 {
            self.verdict = Verdict::AlreadyComplete;
            return Ok(false);
        }
        if !head.is_success() {
            self.verdict = Verdict::Status(head.status);
            return Ok(false);
        }
        if self.head_only {
            self.verdict = Verdict::HeadersOnly;
            return Ok(false);
        }
        self.check_cancel()?;

        let start = if self.resume_offset > 0 && head.status == 206 {
            self.resume_offset
        } else {
            if self.resume_offset > 0 {
                tracing::warn!(
                    task = %self.task,
                    status = head.status,
                    "server ignored the range request; restarting from byte 0"
                );
            }
            0
        };
        let write_start = if start > 0 {
            WriteStart::At(start)
        } else {
            WriteStart::Truncate
        };
        let out = match OutputFile::open(self.path, write_start) {
            Ok(out) => out,
            Err(e) => return Err(self.fail_io("open", e)),
        };

        // 204 carries no body whatever its headers say.
        self.total = if head.status == 204 {
            None
        } else {
            head.content_length().and_then(|len| len.checked_add(start))
        };
        self.verdict = Verdict::Streaming;
        self.out = Some(out);
        tracing::debug!(
            task = %self.task,
            phase = "streaming",
            offset = start,
            total = ?self.total,
            "writing body"
        );
        self.progress.record(self.task, self.total, start);
        Ok(true)
    }

    fn on_data(&mut self, data: &[u8]) -> io::Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let written = match self.out.as_mut() {
            Some(out) => out.append(data),
            None => return Err(stop()),
        };
        if let Err(e) = written {
            return Err(self.fail_io("write", e));
        }
        self.progress.record(self.task, None, data.len() as u64);
        self.check_cancel()
    }

    fn should_stop(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
