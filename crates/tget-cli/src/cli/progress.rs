//! Terminal progress printer and end-of-run summary.

use std::collections::HashSet;
use std::io::{IsTerminal, Write};
use std::sync::Arc;
use std::time::Duration;
use tget_core::progress::{ProgressAggregator, ProgressSnapshot, TaskProgress};
use tget_core::{ResultSet, TaskId};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const PROGRESS_INTERVAL_MS: u64 = 500;

pub fn format_bytes(n: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if n < 1024 {
        return format!("{} B", n);
    }
    let mut value = n as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!("{}h{:02}m{:02}s", secs / 3600, secs / 60 % 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

fn task_label(task: &TaskProgress) -> String {
    if task.label.is_empty() {
        task.id.to_string()
    } else {
        task.label.clone()
    }
}

/// One status line for the whole run.
pub fn render_status(snap: &ProgressSnapshot) -> String {
    let t = &snap.totals;
    format!(
        "[{}/{}] {} at {}/s, {} active",
        t.finished(),
        snap.tasks.len(),
        format_bytes(t.bytes),
        format_bytes(t.bytes_per_sec() as u64),
        t.active
    )
}

/// One line for a finished task.
pub fn render_task(task: &TaskProgress) -> String {
    let size = match task.total {
        Some(total) => format!("{}/{}", format_bytes(task.bytes), format_bytes(total)),
        None => format_bytes(task.bytes),
    };
    format!(
        "{}: {} ({})",
        task_label(task),
        task.detail.as_deref().unwrap_or("running"),
        size
    )
}

/// One line for a task still running: percentage and ETA when the total is
/// known, otherwise bytes, rate and elapsed time.
pub fn render_active(task: &TaskProgress) -> String {
    let rate = task.bytes_per_sec();
    match (task.fraction(), task.total) {
        (Some(fraction), Some(total)) => {
            let remaining = total.saturating_sub(task.bytes) as f64;
            let eta = Duration::try_from_secs_f64(remaining / rate)
                .map(format_duration)
                .unwrap_or_else(|_| "?".to_string());
            format!(
                "{}: {:.1}% ({}/{}) at {}/s, ETA {}",
                task_label(task),
                fraction * 100.0,
                format_bytes(task.bytes),
                format_bytes(total),
                format_bytes(rate as u64),
                eta
            )
        }
        _ => format!(
            "{}: {} at {}/s, {} elapsed",
            task_label(task),
            format_bytes(task.bytes),
            format_bytes(rate as u64),
            format_duration(task.elapsed())
        ),
    }
}

/// Terminal state of the printer between ticks.
struct Board {
    reported: HashSet<TaskId>,
    /// Lines of the live block drawn last tick; erased before the next one.
    drawn: usize,
    live: bool,
}

impl Board {
    fn new(live: bool) -> Self {
        Self {
            reported: HashSet::new(),
            drawn: 0,
            live,
        }
    }

    fn draw(&mut self, snap: &ProgressSnapshot, last: bool) {
        let mut err = std::io::stderr().lock();
        if self.drawn > 0 {
            let _ = write!(err, "\x1b[{}A\x1b[J", self.drawn);
            self.drawn = 0;
        }
        for task in &snap.tasks {
            if task.state.is_terminal() && self.reported.insert(task.id) {
                let _ = writeln!(err, "{}", render_task(task));
            }
        }
        if self.live || last {
            if !last {
                for task in snap.tasks.iter().filter(|t| !t.state.is_terminal()) {
                    let _ = writeln!(err, "  {}", render_active(task));
                    self.drawn += 1;
                }
            }
            let _ = writeln!(err, "  {}", render_status(snap));
            self.drawn += 1;
        }
        let _ = err.flush();
    }
}

/// Background printer; stop it with [`Printer::stop`].
pub struct Printer {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

pub fn spawn_printer(progress: Arc<ProgressAggregator>) -> Printer {
    let (stop, mut stopped) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        // Redrawing in place only makes sense on a terminal.
        let mut board = Board::new(std::io::stderr().is_terminal());
        let mut ticker = tokio::time::interval(Duration::from_millis(PROGRESS_INTERVAL_MS));
        loop {
            tokio::select! {
                _ = ticker.tick() => board.draw(&progress.snapshot(), false),
                _ = &mut stopped => break,
            }
        }
        board.draw(&progress.snapshot(), true);
    });
    Printer { stop, handle }
}

impl Printer {
    /// Prints the final state and waits for the printer task to end.
    pub async fn stop(self) {
        let _ = self.stop.send(());
        let _ = self.handle.await;
    }
}

pub fn print_summary(result: &ResultSet) {
    println!(
        "{} completed, {} aborted, {} failed",
        result.completed(),
        result.aborted(),
        result.failed()
    );
    for report in result.not_completed() {
        println!("  {} {}: {}", report.id, report.url, report.outcome);
    }
    tracing::info!(
        completed = result.completed(),
        aborted = result.aborted(),
        failed = result.failed(),
        "session finished"
    );
}
