//! Transfer failure type.

use std::io;
use std::path::PathBuf;

use crate::channel::ChannelError;

/// Why a task ended in `Outcome::Failed`.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Network-level failure on the task's channel.
    #[error("channel {channel}: {source}")]
    Channel {
        channel: String,
        #[source]
        source: ChannelError,
    },
    /// Non-success, non-redirect HTTP status.
    #[error("HTTP {0}")]
    HttpStatus(u32),
    /// Local disk failure; bytes written before it stay on disk.
    #[error("{context} {shown}: {source}", shown = .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The connection ended cleanly before the declared length arrived.
    #[error("body ended early: expected {expected} bytes, got {received}")]
    ShortBody { expected: u64, received: u64 },
    /// The worker running the task panicked.
    #[error("worker panicked")]
    WorkerPanicked,
    /// No worker thread could be started for the task's channel.
    #[error("could not start worker: {0}")]
    NoWorker(String),
}

impl TransferError {
    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        TransferError::Io {
            context,
            path: path.into(),
            source,
        }
    }
}
