//! Progress aggregation for a run.
//!
//! Every worker reports into one `ProgressAggregator` shared through an `Arc`.
//! All counters sit behind a single mutex, so concurrent events never lose
//! updates. Renderers call `snapshot` periodically; when a task's total is
//! unknown they can fall back to rate and elapsed time via
//! `TaskProgress::bytes_per_sec`.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::task::TaskId;
use crate::transfer::Outcome;

/// Lifecycle of a task as seen by the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Active,
    Completed,
    Aborted,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        self != TaskState::Active
    }

    fn of(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Completed => TaskState::Completed,
            Outcome::Aborted(_) => TaskState::Aborted,
            Outcome::Failed(_) => TaskState::Failed,
        }
    }
}

/// Progress of one task.
#[derive(Debug, Clone)]
pub struct TaskProgress {
    pub id: TaskId,
    pub label: String,
    /// Bytes of the output file that are in place (resume offset included).
    pub bytes: u64,
    /// Expected final size; `None` when the server did not say.
    pub total: Option<u64>,
    pub state: TaskState,
    /// Outcome text once terminal.
    pub detail: Option<String>,
    started: Instant,
    finished: Option<Instant>,
}

impl TaskProgress {
    fn new(id: TaskId, label: String, now: Instant) -> Self {
        Self {
            id,
            label,
            bytes: 0,
            total: None,
            state: TaskState::Active,
            detail: None,
            started: now,
            finished: None,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.finished.unwrap_or_else(Instant::now) - self.started
    }

    pub fn bytes_per_sec(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.bytes as f64 / secs
    }

    /// Fraction complete in [0.0, 1.0]; `None` when the total is unknown.
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(1.0),
            Some(total) => Some((self.bytes as f64 / total as f64).min(1.0)),
            None => None,
        }
    }
}

/// Run-wide counters.
#[derive(Debug, Clone, Default)]
pub struct ProgressTotals {
    pub bytes: u64,
    pub active: usize,
    pub completed: usize,
    pub aborted: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

impl ProgressTotals {
    pub fn finished(&self) -> usize {
        self.completed + self.aborted + self.failed
    }

    pub fn bytes_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.bytes as f64 / secs
    }
}

/// Point-in-time copy of all progress, ordered by task id.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub tasks: Vec<TaskProgress>,
    pub totals: ProgressTotals,
}

/// Thread-safe sink for progress events of one run.
#[derive(Debug)]
pub struct ProgressAggregator {
    started: Instant,
    tasks: Mutex<BTreeMap<TaskId, TaskProgress>>,
}

impl Default for ProgressAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressAggregator {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            tasks: Mutex::new(BTreeMap::new()),
        }
    }

    fn with_tasks<R>(&self, f: impl FnOnce(&mut BTreeMap<TaskId, TaskProgress>) -> R) -> R {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut tasks)
    }

    /// A worker picked up `id`.
    pub fn begin(&self, id: TaskId, label: &str) {
        let now = Instant::now();
        self.with_tasks(|tasks| {
            tasks.insert(id, TaskProgress::new(id, label.to_string(), now));
        });
    }

    /// `delta` more bytes are in place; `total` is the expected size if known.
    pub fn record(&self, id: TaskId, total: Option<u64>, delta: u64) {
        let now = Instant::now();
        self.with_tasks(|tasks| {
            let entry = tasks
                .entry(id)
                .or_insert_with(|| TaskProgress::new(id, String::new(), now));
            if total.is_some() {
                entry.total = total;
            }
            entry.bytes += delta;
        });
    }

    /// Terminal event. Later events for `id` only update byte counters.
    pub fn finish(&self, id: TaskId, outcome: &Outcome) {
        let now = Instant::now();
        self.with_tasks(|tasks| {
            let entry = tasks
                .entry(id)
                .or_insert_with(|| TaskProgress::new(id, String::new(), now));
            entry.state = TaskState::of(outcome);
            entry.detail = Some(outcome.to_string());
            entry.finished = Some(now);
        });
    }

    pub fn get(&self, id: TaskId) -> Option<TaskProgress> {
        self.with_tasks(|tasks| tasks.get(&id).cloned())
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let elapsed = self.started.elapsed();
        self.with_tasks(|tasks| {
            let mut totals = ProgressTotals {
                elapsed,
                ..ProgressTotals::default()
            };
            for t in tasks.values() {
                totals.bytes += t.bytes;
                match t.state {
                    TaskState::Active => totals.active += 1,
                    TaskState::Completed => totals.completed += 1,
                    TaskState::Aborted => totals.aborted += 1,
                    TaskState::Failed => totals.failed += 1,
                }
            }
            ProgressSnapshot {
                tasks: tasks.values().cloned().collect(),
                totals,
            }
        })
    }
}
