//! # Engine Configuration
//!
//! Typed configuration for the orchestration engine. Defaults are layered
//! under an optional config file and `CASCADE_`-prefixed environment
//! variables (e.g. `CASCADE_EXECUTION__MAX_CONCURRENT_STEPS=4`).
//!
//! Every numeric constant the engine consults (step timeout, reenqueue
//! delays, backoff caps, pool safety fraction) lives here; nothing is
//! hard-coded at the call sites.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How discovery picks the processing mode for a pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy")]
pub enum ProcessingModePolicy {
    /// Always execute the frontier one step at a time
    Sequential,
    /// Always execute the frontier on the worker pool
    Concurrent,
    /// Concurrent only when the ready frontier is at least this wide
    FanOut { min_ready_steps: usize },
}

impl Default for ProcessingModePolicy {
    fn default() -> Self {
        Self::FanOut { min_ready_steps: 2 }
    }
}

/// Step execution and concurrency settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub processing_mode: ProcessingModePolicy,
    /// Upper bound on concurrently executing steps in one pass
    pub max_concurrent_steps: usize,
    /// Hard per-step handler timeout
    pub step_execution_timeout_seconds: u64,
    /// Cap on steps taken from the frontier in a single pass
    pub max_steps_per_pass: usize,
    /// Capacity of the shared resource concurrent handlers draw on
    /// (e.g. a database connection pool)
    pub shared_resource_capacity: usize,
    /// Fraction of the shared resource the executor may consume
    pub resource_safety_fraction: f64,
    /// Concurrency floor, applied regardless of computed pressure
    pub min_concurrency: usize,
    /// Concurrency ceiling, applied regardless of computed pressure
    pub max_concurrency: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            processing_mode: ProcessingModePolicy::default(),
            max_concurrent_steps: 10,
            step_execution_timeout_seconds: 30,
            max_steps_per_pass: 100,
            shared_resource_capacity: 25,
            resource_safety_fraction: 0.5,
            min_concurrency: 1,
            max_concurrency: 25,
        }
    }
}

impl ExecutionConfig {
    pub fn step_execution_timeout(&self) -> Duration {
        Duration::from_secs(self.step_execution_timeout_seconds)
    }

    /// Concurrent execution width for one pass: the safety fraction of the
    /// shared resource, clamped to the configured floor/ceiling and never
    /// above `max_concurrent_steps`.
    pub fn effective_concurrency(&self) -> usize {
        let budget =
            (self.shared_resource_capacity as f64 * self.resource_safety_fraction).floor() as usize;
        budget
            .max(self.min_concurrency)
            .min(self.max_concurrency)
            .min(self.max_concurrent_steps.max(1))
    }
}

/// Fixed reenqueue delays keyed by execution status, seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReenqueueDelays {
    pub has_ready_steps: u64,
    pub waiting_for_dependencies: u64,
    pub processing: u64,
}

impl Default for ReenqueueDelays {
    fn default() -> Self {
        Self {
            has_ready_steps: 0,
            waiting_for_dependencies: 60,
            processing: 10,
        }
    }
}

/// Retry backoff and reenqueue delay settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Base delay for exponential backoff, seconds
    pub base_delay_seconds: u64,
    /// Cap on any single step backoff, seconds
    pub max_delay_seconds: u64,
    /// Exponential multiplier
    pub multiplier: f64,
    /// Randomize computed backoff to avoid thundering herds
    pub jitter_enabled: bool,
    /// Maximum jitter as a fraction of the computed delay
    pub jitter_max_percentage: f64,
    pub reenqueue_delays: ReenqueueDelays,
    /// Fallback reenqueue delay for states without a table entry, seconds
    pub default_reenqueue_delay: u64,
    /// Cap on any computed reenqueue delay, seconds
    pub max_reenqueue_delay: u64,
    /// Safety buffer added on top of a step's remaining backoff, seconds
    pub buffer_seconds: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_seconds: 1,
            max_delay_seconds: 300,
            multiplier: 2.0,
            jitter_enabled: false,
            jitter_max_percentage: 0.1,
            reenqueue_delays: ReenqueueDelays::default(),
            default_reenqueue_delay: 30,
            max_reenqueue_delay: 300,
            buffer_seconds: 5,
        }
    }
}

impl BackoffConfig {
    /// Exponential backoff for a step that has made `attempts` attempts:
    /// `base * multiplier^attempts`, capped at `max_delay_seconds`.
    pub fn exponential_backoff_seconds(&self, attempts: i32) -> i64 {
        let delay = self.base_delay_seconds as f64 * self.multiplier.powi(attempts.max(0));
        delay.min(self.max_delay_seconds as f64) as i64
    }
}

/// Event bus settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Broadcast channel capacity for the lifecycle event bus
    pub channel_capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

/// Root engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub execution: ExecutionConfig,
    pub backoff: BackoffConfig,
    pub events: EventConfig,
}

impl EngineConfig {
    /// Load configuration: defaults, then an optional config file, then
    /// `CASCADE_`-prefixed environment variables (double underscore as the
    /// section separator).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&EngineConfig::default())?);
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder
            .add_source(config::Environment::with_prefix("CASCADE").separator("__"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_engine_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.execution.step_execution_timeout_seconds, 30);
        assert_eq!(config.backoff.buffer_seconds, 5);
        assert_eq!(config.backoff.max_reenqueue_delay, 300);
        assert_eq!(config.backoff.reenqueue_delays.waiting_for_dependencies, 60);
        assert_eq!(
            config.execution.processing_mode,
            ProcessingModePolicy::FanOut { min_ready_steps: 2 }
        );
    }

    #[test]
    fn exponential_backoff_growth_and_cap() {
        let backoff = BackoffConfig::default();
        assert_eq!(backoff.exponential_backoff_seconds(0), 1);
        assert_eq!(backoff.exponential_backoff_seconds(1), 2);
        assert_eq!(backoff.exponential_backoff_seconds(3), 8);
        assert_eq!(backoff.exponential_backoff_seconds(30), 300);
    }

    #[test]
    fn effective_concurrency_respects_floor_and_ceiling() {
        let mut execution = ExecutionConfig::default();
        assert_eq!(execution.effective_concurrency(), 10); // 12 budget, capped by max_concurrent_steps

        execution.shared_resource_capacity = 1;
        assert_eq!(execution.effective_concurrency(), 1); // floor

        execution.shared_resource_capacity = 200;
        execution.max_concurrent_steps = 100;
        assert_eq!(execution.effective_concurrency(), 25); // ceiling
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let config = EngineConfig::load(None).unwrap();
        assert_eq!(config.events.channel_capacity, 1024);
    }
}
