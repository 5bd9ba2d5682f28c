///
/// # Scheduler Configuration
///
/// Tunables for a `Scheduler`, loadable from TOML. Every field has a default,
/// so an empty file is a valid configuration.
///
/// ## Example spindle.toml
///
/// ```toml
/// stack_size = 131072    # bytes per thread, at least 16 KiB
/// timeslice_ms = 10      # preemption period
/// queue_capacity = 32    # initial ready/blocked queue capacity
/// ```
///

use serde::{Deserialize, Serialize};
use spindle_std_context::{DEFAULT_STACK_SIZE, MIN_STACK_SIZE};
use std::path::Path;
use std::time::Duration;

use crate::errors::SchedulerError;

/// 100 Hz, the classic uthread preemption rate
pub const DEFAULT_TIMESLICE_MS: u64 = 10;

pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    pub stack_size: usize,
    pub timeslice_ms: u64,
    pub queue_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            timeslice_ms: DEFAULT_TIMESLICE_MS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl SchedulerConfig {
    pub fn from_path(path: &Path) -> Result<Self, SchedulerError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, SchedulerError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.stack_size < MIN_STACK_SIZE {
            return Err(SchedulerError::InvalidConfig(format!(
                "stack_size {} is below the minimum of {} bytes",
                self.stack_size, MIN_STACK_SIZE
            )));
        }
        if self.timeslice_ms == 0 {
            return Err(SchedulerError::InvalidConfig(
                "timeslice_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeslice(&self) -> Duration {
        Duration::from_millis(self.timeslice_ms)
    }

    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    pub fn with_timeslice_ms(mut self, timeslice_ms: u64) -> Self {
        self.timeslice_ms = timeslice_ms;
        self
    }
}
