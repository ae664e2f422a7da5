//! Orchestrator: splits the task list across channels, runs one pool per
//! channel and gathers every task's report.

use std::sync::Arc;
use std::thread;

use crate::channel::Channel;
use crate::control::CancelToken;
use crate::distribute::distribute;
use crate::naming::FilenameResolver;
use crate::pool::{run_pool, PoolShared};
use crate::progress::ProgressAggregator;
use crate::task::{Task, TaskId};
use crate::transfer::{Outcome, TaskReport, TransferError, TransferOptions};

/// Errors that stop a run before any transfer starts.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("no usable channels")]
    NoChannels,
    #[error("no URLs to download")]
    EmptyTaskList,
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("channel {label} not ready after {attempts} attempts")]
    ChannelNotReady { label: String, attempts: u32 },
    #[error("cancelled during setup")]
    Cancelled,
}

/// Knobs for one run.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Transfers in flight per channel; values below 1 mean 1.
    pub concurrency_per_channel: usize,
    pub transfer: TransferOptions,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency_per_channel: 10,
            transfer: TransferOptions::default(),
        }
    }
}

/// One report per input task, ordered by task id.
#[derive(Debug, Default)]
pub struct ResultSet {
    reports: Vec<TaskReport>,
}

impl ResultSet {
    fn from_reports(mut reports: Vec<TaskReport>) -> Self {
        reports.sort_by_key(|r| r.id);
        Self { reports }
    }

    pub fn reports(&self) -> &[TaskReport] {
        &self.reports
    }

    pub fn into_reports(self) -> Vec<TaskReport> {
        self.reports
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskReport> {
        self.reports
            .binary_search_by_key(&id, |r| r.id)
            .ok()
            .map(|i| &self.reports[i])
    }

    pub fn completed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Completed))
    }

    pub fn aborted(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Aborted(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.reports.iter().filter(|r| pred(&r.outcome)).count()
    }

    /// Reports of tasks that did not complete (candidates for a rerun with resume).
    pub fn not_completed(&self) -> impl Iterator<Item = &TaskReport> {
        self.reports.iter().filter(|r| !r.outcome.is_completed())
    }

    pub fn all_completed(&self) -> bool {
        self.reports.iter().all(|r| r.outcome.is_completed())
    }
}

/// Drives a whole run over a fixed set of ready channels.
pub struct Orchestrator {
    channels: Vec<Arc<dyn Channel>>,
    options: RunOptions,
    progress: Arc<ProgressAggregator>,
    cancel: CancelToken,
}

impl Orchestrator {
    pub fn new(channels: Vec<Arc<dyn Channel>>, options: RunOptions) -> Result<Self, SetupError> {
        if channels.is_empty() {
            return Err(SetupError::NoChannels);
        }
        Ok(Self {
            channels,
            options,
            progress: Arc::new(ProgressAggregator::new()),
            cancel: CancelToken::new(),
        })
    }

    /// Report progress into an aggregator the caller also reads.
    pub fn with_progress(mut self, progress: Arc<ProgressAggregator>) -> Self {
        self.progress = progress;
        self
    }

    /// Use a cancellation token the caller can trigger.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn progress(&self) -> &Arc<ProgressAggregator> {
        &self.progress
    }

    /// Runs every task and blocks until all pools drain.
    pub fn run(&self, tasks: Vec<Task>) -> ResultSet {
        let total = tasks.len();
        let ids: Vec<(TaskId, String)> = tasks.iter().map(|t| (t.id(), t.url().to_string())).collect();
        let shared = PoolShared {
            resolver: Arc::new(FilenameResolver::new(self.options.transfer.name_policy())),
            progress: Arc::clone(&self.progress),
            cancel: self.cancel.clone(),
            options: self.options.transfer,
        };
        let chunks = distribute(tasks, self.channels.len());
        tracing::info!(
            tasks = total,
            channels = self.channels.len(),
            concurrency = self.options.concurrency_per_channel,
            "starting run"
        );

        let mut reports = Vec::with_capacity(total);
        thread::scope(|s| {
            let handles: Vec<_> = chunks
                .into_iter()
                .zip(&self.channels)
                .filter(|(chunk, _)| !chunk.is_empty())
                .map(|(chunk, channel)| {
                    let channel = Arc::clone(channel);
                    let shared = &shared;
                    let concurrency = self.options.concurrency_per_channel;
                    tracing::debug!(chunk = chunk.index, tasks = chunk.len(), channel = channel.label(), "chunk assigned");
                    s.spawn(move || run_pool(channel, chunk.items, concurrency, shared))
                })
                .collect();
            for h in handles {
                match h.join() {
                    Ok(mut chunk_reports) => reports.append(&mut chunk_reports),
                    Err(_) => tracing::error!("pool thread panicked"),
                }
            }
        });

        let mut result = ResultSet::from_reports(reports);
        if result.len() < total {
            let mut reports = result.into_reports();
            for (id, url) in ids {
                if reports.iter().any(|r| r.id == id) {
                    continue;
                }
                let outcome = Outcome::Failed(TransferError::WorkerPanicked);
                self.progress.finish(id, &outcome);
                reports.push(TaskReport {
                    id,
                    url,
                    channel: String::new(),
                    output: None,
                    bytes_on_disk: 0,
                    total: None,
                    outcome,
                });
            }
            result = ResultSet::from_reports(reports);
        }

        tracing::info!(
            completed = result.completed(),
            aborted = result.aborted(),
            failed = result.failed(),
            "run finished"
        );
        result
    }
}

/// One-shot form of [`Orchestrator::run`].
pub fn run(
    channels: Vec<Arc<dyn Channel>>,
    tasks: Vec<Task>,
    options: RunOptions,
) -> Result<ResultSet, SetupError> {
    Ok(Orchestrator::new(channels, options)?.run(tasks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::scripted::{Script, ScriptedChannel};
    use crate::task::{build_tasks, RequestTemplate};
    use crate::transfer::AbortReason;
    use std::collections::HashSet;
    use std::fs;
    use std::time::Duration;

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("http://files.test/f{}.bin", i)).collect()
    }

    fn channel(label: &str, n: usize) -> Arc<ScriptedChannel> {
        let ch = urls(n).iter().enumerate().fold(ScriptedChannel::new(label), |ch, (i, u)| {
            ch.serve(
                u,
                Script::Body {
                    body: vec![i as u8; 10 + i],
                    ranges: true,
                },
            )
        });
        Arc::new(ch)
    }

    #[test]
    fn zero_channels_is_a_setup_error() {
        let err = Orchestrator::new(Vec::new(), RunOptions::default()).err();
        assert!(matches!(err, Some(SetupError::NoChannels)));
    }

    #[test]
    fn tasks_spread_over_channels() {
        let dir = tempfile::tempdir().unwrap();
        let chans: Vec<_> = (0..3).map(|i| channel(&format!("ch{}", i), 10)).collect();
        let dyn_chans: Vec<Arc<dyn Channel>> = chans.iter().map(|c| c.clone() as Arc<dyn Channel>).collect();
        let tasks = build_tasks(&urls(10), &RequestTemplate::default(), dir.path()).unwrap();

        let result = run(dyn_chans, tasks, RunOptions::default()).unwrap();

        assert_eq!(result.len(), 10);
        assert!(result.all_completed());
        let counts: Vec<_> = chans.iter().map(|c| c.request_log().len()).collect();
        assert_eq!(counts, vec![3, 3, 4]);
        for (i, report) in result.reports().iter().enumerate() {
            assert_eq!(report.id, TaskId(i));
            let data = fs::read(report.output.as_ref().unwrap()).unwrap();
            assert_eq!(data, vec![i as u8; 10 + i]);
        }
        // Last chunk goes to the last channel.
        assert_eq!(result.get(TaskId(9)).unwrap().channel, "ch2");
    }

    #[test]
    fn more_channels_than_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let chans: Vec<Arc<dyn Channel>> = (0..5).map(|i| channel(&format!("ch{}", i), 2) as Arc<dyn Channel>).collect();
        let tasks = build_tasks(&urls(2), &RequestTemplate::default(), dir.path()).unwrap();
        let result = run(chans, tasks, RunOptions::default()).unwrap();
        assert_eq!(result.len(), 2);
        assert!(result.all_completed());
    }

    #[test]
    fn failures_do_not_stop_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let good = channel("good", 4);
        let bad: Arc<dyn Channel> = Arc::new(ScriptedChannel::new("bad").serve(
            "http://files.test/f2.bin",
            Script::Unreachable,
        ));
        let tasks = build_tasks(&urls(4), &RequestTemplate::default(), dir.path()).unwrap();
        let result = run(vec![good as Arc<dyn Channel>, bad], tasks, RunOptions::default()).unwrap();

        assert_eq!(result.completed(), 2);
        assert_eq!(result.failed(), 2);
        let failed: HashSet<_> = result.not_completed().map(|r| r.id).collect();
        assert_eq!(failed, HashSet::from([TaskId(2), TaskId(3)]));
    }

    #[test]
    fn same_name_from_different_channels_never_collides() {
        let dir = tempfile::tempdir().unwrap();
        let urls: Vec<String> = (0..6).map(|i| format!("http://mirror{}.test/same.iso", i)).collect();
        let chans: Vec<Arc<dyn Channel>> = (0..3)
            .map(|c| {
                let ch = urls.iter().fold(ScriptedChannel::new(&format!("ch{}", c)), |ch, u| {
                    ch.serve(
                        u,
                        Script::Body {
                            body: u.as_bytes().to_vec(),
                            ranges: false,
                        },
                    )
                });
                Arc::new(ch.with_delay(Duration::from_millis(5))) as Arc<dyn Channel>
            })
            .collect();
        let tasks = build_tasks(&urls, &RequestTemplate::default(), dir.path()).unwrap();
        let result = run(chans, tasks, RunOptions::default()).unwrap();

        assert!(result.all_completed());
        let outputs: HashSet<_> = result.reports().iter().map(|r| r.output.clone().unwrap()).collect();
        assert_eq!(outputs.len(), 6);
        for report in result.reports() {
            let data = fs::read(report.output.as_ref().unwrap()).unwrap();
            assert_eq!(data, report.url.as_bytes());
        }
    }

    #[test]
    fn cancelled_before_start_aborts_everything() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let chans: Vec<Arc<dyn Channel>> = vec![channel("a", 6), channel("b", 6)];
        let tasks = build_tasks(&urls(6), &RequestTemplate::default(), dir.path()).unwrap();
        let orch = Orchestrator::new(chans, RunOptions::default())
            .unwrap()
            .with_cancel(cancel);
        let result = orch.run(tasks);

        assert_eq!(result.len(), 6);
        assert!(result
            .reports()
            .iter()
            .all(|r| matches!(r.outcome, Outcome::Aborted(AbortReason::Cancelled))));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn shared_progress_sees_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let progress = Arc::new(ProgressAggregator::new());
        let chans: Vec<Arc<dyn Channel>> = vec![channel("a", 3)];
        let tasks = build_tasks(&urls(3), &RequestTemplate::default(), dir.path()).unwrap();
        let orch = Orchestrator::new(chans, RunOptions::default())
            .unwrap()
            .with_progress(Arc::clone(&progress));
        orch.run(tasks);

        let snap = progress.snapshot();
        assert_eq!(snap.totals.completed, 3);
        assert_eq!(snap.totals.bytes, 10 + 11 + 12);
        assert_eq!(snap.tasks[1].label, "f1.bin");
    }

    #[test]
    fn empty_task_list_yields_empty_result() {
        let chans: Vec<Arc<dyn Channel>> = vec![channel("a", 0)];
        let result = run(chans, Vec::new(), RunOptions::default()).unwrap();
        assert!(result.is_empty());
        assert!(result.all_completed());
    }
}
