//! Scheduler configuration
//!
//! Configuration can be built programmatically, read from environment
//! variables, or loaded from a JSON file.

use crate::error::ConfigError;
use crate::frame_budget::DEFAULT_FRAME_BUDGET;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding the frame budget, in milliseconds
pub const ENV_FRAME_BUDGET_MS: &str = "FRAME_SCHEDULER_BUDGET_MS";

/// Tunables for a [`FrameScheduler`](crate::FrameScheduler)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How long one frame may keep running jobs
    #[serde(rename = "frame_budget_ms", with = "millis")]
    pub frame_budget: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { frame_budget: DEFAULT_FRAME_BUDGET }
    }
}

impl SchedulerConfig {
    pub fn new(frame_budget: Duration) -> Self {
        Self { frame_budget }
    }

    /// Sets the frame budget.
    pub fn with_frame_budget(mut self, frame_budget: Duration) -> Self {
        self.frame_budget = frame_budget;
        self
    }

    /// Sets the frame budget in milliseconds.
    pub fn with_frame_budget_ms(self, ms: u64) -> Self {
        self.with_frame_budget(Duration::from_millis(ms))
    }

    /// Defaults overridden by [`ENV_FRAME_BUDGET_MS`] when it is set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) but reads variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_FRAME_BUDGET_MS) {
            let ms = value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: ENV_FRAME_BUDGET_MS,
                value: value.clone(),
            })?;
            config = config.with_frame_budget_ms(ms);
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let bytes = fs::read(path)?;
        let config: Self = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_budget.is_zero() {
            return Err(ConfigError::ZeroBudget);
        }
        Ok(())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
