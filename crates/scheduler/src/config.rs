use std::time::Duration;

use cadence_core::config::SchedulerSettings;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};
use crate::retry::RetryPolicy;

/// Scheduler configuration, typically parsed from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Dispatcher tick interval in milliseconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Number of worker threads. 0 = available parallelism.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// `max_retries` for tasks that don't set their own.
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
    /// Backoff applied between retries.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_tick_interval() -> u64 { 100 }
fn default_worker_threads() -> usize { 0 }
fn default_max_retries() -> u32 { 3 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            worker_threads: default_worker_threads(),
            default_max_retries: default_max_retries(),
            retry: RetryConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Parse from a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| SchedulerError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve worker thread count (0 means use available parallelism).
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.worker_threads
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.policy()
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(SchedulerError::InvalidConfig(
                "tick_interval_ms must be greater than 0".into(),
            ));
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(SchedulerError::InvalidConfig(format!(
                "retry multiplier must be >= 1.0, got {}",
                self.retry.multiplier
            )));
        }
        Ok(())
    }
}

impl From<&SchedulerSettings> for SchedulerConfig {
    fn from(s: &SchedulerSettings) -> Self {
        let strategy = match s.retry_strategy.as_str() {
            "fixed" => RetryStrategy::Fixed,
            _ => RetryStrategy::Exponential,
        };
        Self {
            tick_interval_ms: s.tick_interval_ms,
            worker_threads: s.worker_threads,
            default_max_retries: s.default_max_retries,
            retry: RetryConfig {
                strategy,
                base_delay_ms: s.retry_base_ms,
                multiplier: s.retry_multiplier,
                max_delay_ms: s.retry_max_ms,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategy {
    Exponential,
    Fixed,
}

/// Retry backoff settings. For `fixed`, `base_delay_ms` is the delay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_strategy")]
    pub strategy: RetryStrategy,
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

fn default_strategy() -> RetryStrategy { RetryStrategy::Exponential }
fn default_base_delay() -> u64 { 1_000 }
fn default_multiplier() -> f64 { 2.0 }
fn default_max_delay() -> u64 { 60_000 }

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            base_delay_ms: default_base_delay(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        let base = Duration::from_millis(self.base_delay_ms);
        match self.strategy {
            RetryStrategy::Fixed => RetryPolicy::fixed(base),
            RetryStrategy::Exponential => RetryPolicy::exponential(
                base,
                self.multiplier,
                Duration::from_millis(self.max_delay_ms),
            ),
        }
    }
}
