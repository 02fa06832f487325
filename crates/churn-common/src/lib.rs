use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub target: TargetConfig,
    pub task: TaskConfig,
    pub swarm: SwarmConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct TargetConfig {
    /// `host:port` every simulated user connects to.
    pub address: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:2345".to_string(),
        }
    }
}

/// Per-invocation behavior of the connect/hold/close task.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct TaskConfig {
    /// Lower bound (inclusive) of the hold time, in whole seconds
    pub min_hold_secs: u64,
    /// Upper bound (inclusive) of the hold time, in whole seconds
    pub max_hold_secs: u64,
    /// Pause after a failed connect before the task returns
    pub backoff_ms: u64,
    /// 0 leaves the connect attempt to the OS timeout
    pub connect_timeout_ms: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            min_hold_secs: 1,
            max_hold_secs: 10,
            backoff_ms: 1000,
            connect_timeout_ms: 0,
        }
    }
}

impl TaskConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_ms > 0).then(|| Duration::from_millis(self.connect_timeout_ms))
    }
}

/// How many simulated users run, how fast they ramp up and how long they pause
/// between task invocations.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SwarmConfig {
    pub users: usize,
    /// Users started per second during ramp-up
    pub spawn_rate: f64,
    pub wait_min_secs: f64,
    pub wait_max_secs: f64,
    /// 0 runs until interrupted
    pub run_time_secs: u64,
    /// 0 disables the periodic stats line
    pub report_interval_secs: u64,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            users: 10,
            spawn_rate: 1.0,
            wait_min_secs: 1.0,
            wait_max_secs: 2.0,
            run_time_secs: 0,
            report_interval_secs: 5,
        }
    }
}

impl SwarmConfig {
    pub fn run_time(&self) -> Option<Duration> {
        (self.run_time_secs > 0).then(|| Duration::from_secs(self.run_time_secs))
    }

    pub fn report_interval(&self) -> Option<Duration> {
        (self.report_interval_secs > 0).then(|| Duration::from_secs(self.report_interval_secs))
    }

    /// Time between two user spawns during ramp-up.
    pub fn spawn_interval(&self) -> Result<Duration, ConfigError> {
        if !(self.spawn_rate.is_finite() && self.spawn_rate > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "swarm.spawn_rate must be positive, got {}",
                self.spawn_rate
            )));
        }
        Duration::try_from_secs_f64(1.0 / self.spawn_rate).map_err(|_| {
            ConfigError::Invalid(format!(
                "swarm.spawn_rate {} is too small to schedule",
                self.spawn_rate
            ))
        })
    }

    /// `(min, max)` pause between two tasks of one user.
    pub fn wait_range(&self) -> Result<(Duration, Duration), ConfigError> {
        let (min, max) = (self.wait_min_secs, self.wait_max_secs);
        let invalid =
            || ConfigError::Invalid(format!("swarm wait range [{}, {}] is invalid", min, max));
        if min > max {
            return Err(invalid());
        }
        let min = Duration::try_from_secs_f64(min).map_err(|_| invalid())?;
        let max = Duration::try_from_secs_f64(max).map_err(|_| invalid())?;
        Ok((min, max))
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9100,
        }
    }
}

impl Config {
    /// Parses a YAML document and validates it. Missing sections and fields
    /// take their defaults.
    pub fn from_yaml_str(data: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.address.trim().is_empty() {
            return Err(ConfigError::Invalid("target.address is empty".into()));
        }
        if self.task.min_hold_secs > self.task.max_hold_secs {
            return Err(ConfigError::Invalid(format!(
                "task.min_hold_secs ({}) exceeds task.max_hold_secs ({})",
                self.task.min_hold_secs, self.task.max_hold_secs
            )));
        }
        if self.swarm.users == 0 {
            return Err(ConfigError::Invalid("swarm.users must be at least 1".into()));
        }
        self.swarm.spawn_interval()?;
        self.swarm.wait_range()?;
        Ok(())
    }
}
