use crate::engine::client::TaskOutcome;
use crate::metrics;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Run-wide counters, shared by every user through an `Arc`.
#[derive(Debug, Default)]
pub struct Stats {
    completed: AtomicU64,
    failed: AtomicU64,
    task_errors: AtomicU64,
    users_started: AtomicU64,
    users_stopped: AtomicU64,
    start_failures: AtomicU64,
    hold_ms_total: AtomicU64,
    connect_us_total: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: &TaskOutcome) {
        match *outcome {
            TaskOutcome::Completed { hold, connect, .. } => {
                self.completed.fetch_add(1, Ordering::Relaxed);
                self.hold_ms_total
                    .fetch_add(hold.as_millis() as u64, Ordering::Relaxed);
                self.connect_us_total
                    .fetch_add(connect.as_micros() as u64, Ordering::Relaxed);
                metrics::CONNECTIONS_TOTAL.inc();
                metrics::CONNECT_SECONDS.observe(connect.as_secs_f64());
            }
            TaskOutcome::ConnectFailed { .. } => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                metrics::CONNECT_FAILURES.inc();
            }
        }
    }

    pub fn record_error(&self) {
        self.task_errors.fetch_add(1, Ordering::Relaxed);
        metrics::TASK_ERRORS.inc();
    }

    pub fn user_started(&self) {
        self.users_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn user_stopped(&self) {
        self.users_stopped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn start_failed(&self) {
        self.start_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RunReport {
        let completed = self.completed.load(Ordering::Relaxed);
        let (mean_hold, mean_connect) = if completed == 0 {
            (Duration::ZERO, Duration::ZERO)
        } else {
            (
                Duration::from_millis(self.hold_ms_total.load(Ordering::Relaxed) / completed),
                Duration::from_micros(self.connect_us_total.load(Ordering::Relaxed) / completed),
            )
        };

        RunReport {
            completed,
            failed: self.failed.load(Ordering::Relaxed),
            task_errors: self.task_errors.load(Ordering::Relaxed),
            users_started: self.users_started.load(Ordering::Relaxed),
            users_stopped: self.users_stopped.load(Ordering::Relaxed),
            start_failures: self.start_failures.load(Ordering::Relaxed),
            mean_hold,
            mean_connect,
        }
    }
}

/// Point-in-time copy of [`Stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunReport {
    pub completed: u64,
    pub failed: u64,
    pub task_errors: u64,
    pub users_started: u64,
    pub users_stopped: u64,
    pub start_failures: u64,
    pub mean_hold: Duration,
    pub mean_connect: Duration,
}

impl RunReport {
    /// Task invocations that produced an outcome or an error.
    pub fn attempts(&self) -> u64 {
        self.completed + self.failed + self.task_errors
    }

    pub fn failure_ratio(&self) -> f64 {
        match self.attempts() {
            0 => 0.0,
            n => (self.failed + self.task_errors) as f64 / n as f64,
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "completed={} failed={} errors={} failure_ratio={:.3} mean_hold={:?} mean_connect={:?} users={}/{}",
            self.completed,
            self.failed,
            self.task_errors,
            self.failure_ratio(),
            self.mean_hold,
            self.mean_connect,
            self.users_started.saturating_sub(self.users_stopped),
            self.users_started,
        )
    }
}
