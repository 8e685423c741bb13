use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, key: &str, default: T) -> T {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub scheduler: SchedulerSettings,
    pub logging: LoggingConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `CADENCE_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("CADENCE_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            scheduler: SchedulerSettings::from_env_profiled(p),
            logging: LoggingConfig::from_env_profiled(p),
        }
    }

    /// Load config from a TOML file. Missing keys take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Config = toml::from_str(&raw)?;
        config.scheduler.validate()?;
        Ok(config)
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        let s = &self.scheduler;
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  scheduler:   tick={}ms, workers={}, max_retries={}",
            s.tick_interval_ms,
            s.worker_threads,
            s.default_max_retries
        );
        tracing::info!(
            "  retry:       strategy={}, base={}ms, multiplier={}, cap={}ms",
            s.retry_strategy,
            s.retry_base_ms,
            s.retry_multiplier,
            s.retry_max_ms
        );
        tracing::info!("  logging:     filter={}", self.logging.filter);
    }
}

// ── Scheduler ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub tick_interval_ms: u64,
    /// 0 = use available parallelism.
    pub worker_threads: usize,
    pub default_max_retries: u32,
    /// "exponential" or "fixed"
    pub retry_strategy: String,
    pub retry_base_ms: u64,
    pub retry_multiplier: f64,
    pub retry_max_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            worker_threads: 0,
            default_max_retries: 3,
            retry_strategy: "exponential".to_string(),
            retry_base_ms: 1_000,
            retry_multiplier: 2.0,
            retry_max_ms: 60_000,
        }
    }
}

impl SchedulerSettings {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            tick_interval_ms: profiled_env_parse(p, "TICK_INTERVAL_MS", d.tick_interval_ms),
            worker_threads: profiled_env_parse(p, "WORKER_THREADS", d.worker_threads),
            default_max_retries: profiled_env_parse(p, "DEFAULT_MAX_RETRIES", d.default_max_retries),
            retry_strategy: profiled_env_or(p, "RETRY_STRATEGY", &d.retry_strategy).to_lowercase(),
            retry_base_ms: profiled_env_parse(p, "RETRY_BASE_MS", d.retry_base_ms),
            retry_multiplier: profiled_env_parse(p, "RETRY_MULTIPLIER", d.retry_multiplier),
            retry_max_ms: profiled_env_parse(p, "RETRY_MAX_MS", d.retry_max_ms),
        }
    }

    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.tick_interval_ms == 0 {
            return Err(invalid("tick_interval_ms", self.tick_interval_ms));
        }
        if !matches!(self.retry_strategy.as_str(), "exponential" | "fixed") {
            return Err(invalid("retry_strategy", &self.retry_strategy));
        }
        if !self.retry_multiplier.is_finite() || self.retry_multiplier < 1.0 {
            return Err(invalid("retry_multiplier", self.retry_multiplier));
        }
        Ok(())
    }
}

fn invalid(key: &str, value: impl std::fmt::Display) -> CoreError {
    CoreError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

// ── Logging ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Fallback `EnvFilter` directive when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            filter: profiled_env_or(p, "LOG_FILTER", "info"),
        }
    }
}
