//! Runs a population of simulated users against one target.
//!
//! Users are spawned at `spawn_rate` per second until `users` are running.
//! Each one calls `on_start`, then loops task, record, wait until the run is
//! cancelled, then calls `on_stop`.

use crate::engine::client::{HoldRange, TcpClient};
use crate::engine::stats::{RunReport, Stats};
use crate::engine::wait::WaitTime;
use churn_common::{Config, ConfigError, SwarmConfig, TaskConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub static ACTIVE_USERS: AtomicUsize = AtomicUsize::new(0);

struct ActiveUserGuard;

impl ActiveUserGuard {
    fn new() -> Self {
        ACTIVE_USERS.fetch_add(1, Ordering::SeqCst);
        Self
    }
}

impl Drop for ActiveUserGuard {
    fn drop(&mut self) {
        ACTIVE_USERS.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct Swarm {
    target: String,
    task: TaskConfig,
    config: SwarmConfig,
    spawn_interval: Duration,
    wait: WaitTime,
    stats: Arc<Stats>,
}

impl Swarm {
    /// Fails if the ramp-up or wait settings don't fit in a `Duration`.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            target: config.target.address.clone(),
            task: config.task.clone(),
            config: config.swarm.clone(),
            spawn_interval: config.swarm.spawn_interval()?,
            wait: WaitTime::from_config(&config.swarm)?,
            stats: Arc::new(Stats::new()),
        })
    }

    /// Live counters; keeps updating while `run` is in progress.
    pub fn stats(&self) -> Arc<Stats> {
        Arc::clone(&self.stats)
    }

    /// Runs until `token` is cancelled or the configured run time elapses,
    /// then waits for every user to stop and returns the final counters.
    pub async fn run(self, token: CancellationToken) -> RunReport {
        let run_token = token.child_token();

        if let Some(run_time) = self.config.run_time() {
            let timer_token = run_token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = sleep(run_time) => {
                        info!(run_time_secs = run_time.as_secs(), "Run time elapsed, stopping users");
                        timer_token.cancel();
                    }
                    _ = timer_token.cancelled() => {}
                }
            });
        }

        let reporter = self.config.report_interval().map(|every| {
            tokio::spawn(report_periodically(
                Arc::clone(&self.stats),
                every,
                run_token.clone(),
            ))
        });

        let handles = self.spawn_users(&run_token).await;

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "User task aborted");
            }
        }

        run_token.cancel();
        if let Some(reporter) = reporter {
            let _ = reporter.await;
        }

        let report = self.stats.snapshot();
        info!(%report, "Swarm stopped");
        report
    }

    async fn spawn_users(&self, run_token: &CancellationToken) -> Vec<JoinHandle<()>> {
        let users = self.config.users;
        let mut handles = Vec::with_capacity(users);
        let hold = HoldRange::new(self.task.min_hold_secs, self.task.max_hold_secs);

        info!(
            target_addr = %self.target,
            users,
            spawn_rate = self.config.spawn_rate,
            min_hold_secs = hold.min().as_secs(),
            max_hold_secs = hold.max().as_secs(),
            "Spawning users"
        );

        for id in 0..users {
            if run_token.is_cancelled() {
                break;
            }

            let client = TcpClient::new(self.target.clone(), &self.task);
            handles.push(tokio::spawn(run_user(
                id,
                client,
                self.wait,
                Arc::clone(&self.stats),
                run_token.clone(),
            )));

            if id + 1 < users {
                tokio::select! {
                    _ = sleep(self.spawn_interval) => {}
                    _ = run_token.cancelled() => break,
                }
            }
        }

        info!(spawned = handles.len(), "Ramp-up finished");
        handles
    }
}

async fn run_user(
    id: usize,
    mut client: TcpClient,
    wait: WaitTime,
    stats: Arc<Stats>,
    token: CancellationToken,
) {
    if let Err(e) = client.on_start() {
        error!(user = id, error = %e, "User failed to start");
        stats.start_failed();
        return;
    }

    let _guard = ActiveUserGuard::new();
    stats.user_started();
    let hold = client.hold_range();
    debug!(
        user = id,
        min_hold_secs = hold.min().as_secs(),
        max_hold_secs = hold.max().as_secs(),
        "User started"
    );

    let target = client.target().to_string();
    let mut rng = StdRng::from_entropy();
    loop {
        tokio::select! {
            res = client.connect_to_server() => match res {
                Ok(outcome) => stats.record(&outcome),
                Err(e) => {
                    warn!(user = id, target_addr = %target, error = %e, "Task failed");
                    stats.record_error();
                }
            },
            _ = token.cancelled() => break,
        }

        tokio::select! {
            _ = sleep(wait.sample(&mut rng)) => {}
            _ = token.cancelled() => break,
        }
    }

    client.on_stop();
    stats.user_stopped();
    debug!(user = id, "User stopped");
}

async fn report_periodically(stats: Arc<Stats>, every: Duration, token: CancellationToken) {
    let mut interval = tokio::time::interval(every);
    // first tick fires immediately
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let report = stats.snapshot();
                info!(%report, "Stats");
            }
            _ = token.cancelled() => break,
        }
    }
}
