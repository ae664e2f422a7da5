//! Bounded worker pool for one channel.
//!
//! The chunk becomes a FIFO queue shared by `C` worker threads. Each worker
//! pops the next task, runs it to a terminal outcome on the pool's channel and
//! sends the report back over an mpsc channel. The calling thread collects
//! reports (feeding terminal events to the progress aggregator) until every
//! queued task has one.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use crate::channel::Channel;
use crate::control::CancelToken;
use crate::naming::FilenameResolver;
use crate::progress::ProgressAggregator;
use crate::task::Task;
use crate::transfer::{
    run_transfer, AbortReason, Outcome, TaskReport, TransferContext, TransferError,
    TransferOptions,
};

/// Run-wide state every pool shares.
#[derive(Clone)]
pub struct PoolShared {
    pub resolver: Arc<FilenameResolver>,
    pub progress: Arc<ProgressAggregator>,
    pub cancel: CancelToken,
    pub options: TransferOptions,
}

type Queue = Arc<Mutex<VecDeque<Task>>>;

fn pop(queue: &Queue) -> Option<Task> {
    queue
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .pop_front()
}

fn worker_loop(channel: &dyn Channel, queue: &Queue, shared: &PoolShared, tx: &mpsc::Sender<TaskReport>) {
    while let Some(task) = pop(queue) {
        let report = if shared.cancel.is_cancelled() {
            TaskReport::without_transfer(&task, channel.label(), Outcome::Aborted(AbortReason::Cancelled))
        } else {
            let ctx = TransferContext {
                channel,
                resolver: &shared.resolver,
                progress: &shared.progress,
                cancel: &shared.cancel,
                options: shared.options,
            };
            match panic::catch_unwind(AssertUnwindSafe(|| run_transfer(&task, &ctx))) {
                Ok(report) => report,
                Err(_) => {
                    tracing::error!(task = %task.id(), channel = channel.label(), "worker panicked");
                    TaskReport::without_transfer(
                        &task,
                        channel.label(),
                        Outcome::Failed(TransferError::WorkerPanicked),
                    )
                }
            }
        };
        if tx.send(report).is_err() {
            break;
        }
    }
}

/// Runs `tasks` on `channel` with at most `concurrency` transfers in flight.
///
/// Returns one report per task, in completion order. `concurrency` below 1
/// is treated as 1.
pub fn run_pool(
    channel: Arc<dyn Channel>,
    tasks: Vec<Task>,
    concurrency: usize,
    shared: &PoolShared,
) -> Vec<TaskReport> {
    let count = tasks.len();
    if count == 0 {
        return Vec::new();
    }
    let queue: Queue = Arc::new(Mutex::new(tasks.into_iter().collect()));
    let (tx, rx) = mpsc::channel();
    let num_workers = concurrency.max(1).min(count);
    let mut handles = Vec::with_capacity(num_workers);
    let mut spawn_error = None;
    for n in 0..num_workers {
        let worker_channel = Arc::clone(&channel);
        let queue = Arc::clone(&queue);
        let shared = shared.clone();
        let tx = tx.clone();
        let spawned = thread::Builder::new()
            .name(format!("tget-worker-{}", n))
            .spawn(move || worker_loop(worker_channel.as_ref(), &queue, &shared, &tx));
        match spawned {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                tracing::error!(channel = channel.label(), "failed to spawn worker: {}", e);
                spawn_error = Some(e.to_string());
                break;
            }
        }
    }
    drop(tx);
    tracing::debug!(channel = channel.label(), tasks = count, workers = handles.len(), "pool started");

    let mut reports = Vec::with_capacity(count);
    for report in rx {
        shared.progress.finish(report.id, &report.outcome);
        reports.push(report);
    }
    for h in handles {
        if h.join().is_err() {
            tracing::error!(channel = channel.label(), "worker thread panicked outside a transfer");
        }
    }

    // Only reachable when no worker could be started.
    let reason = spawn_error.unwrap_or_else(|| "worker exited early".to_string());
    while let Some(task) = pop(&queue) {
        let outcome = Outcome::Failed(TransferError::NoWorker(reason.clone()));
        shared.progress.finish(task.id(), &outcome);
        reports.push(TaskReport::without_transfer(&task, channel.label(), outcome));
    }
    reports
}
