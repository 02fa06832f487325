use churn_common::{ConfigError, SwarmConfig};
use rand::Rng;
use std::time::Duration;

/// Pause a user takes between two task invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTime {
    Constant(Duration),
    /// Uniform over `[min, max]`
    Between { min: Duration, max: Duration },
}

impl WaitTime {
    pub fn between(a: Duration, b: Duration) -> Self {
        if a == b {
            WaitTime::Constant(a)
        } else {
            WaitTime::Between {
                min: a.min(b),
                max: a.max(b),
            }
        }
    }

    pub fn from_config(config: &SwarmConfig) -> Result<Self, ConfigError> {
        let (min, max) = config.wait_range()?;
        Ok(Self::between(min, max))
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        match *self {
            WaitTime::Constant(d) => d,
            WaitTime::Between { min, max } => rng.gen_range(min..=max),
        }
    }
}
