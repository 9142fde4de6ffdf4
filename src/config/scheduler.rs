//! Scheduler configuration structures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable for [`SchedulerConfig::between_executions_delay_ms`].
pub const ENV_BETWEEN_EXECUTIONS_DELAY_MS: &str = "COALESCE_BETWEEN_EXECUTIONS_DELAY_MS";
/// Environment variable for [`SchedulerConfig::can_be_dirty`].
pub const ENV_CAN_BE_DIRTY: &str = "COALESCE_CAN_BE_DIRTY";
/// Environment variable for [`SchedulerConfig::should_execute_non_dirty_if_nothing_running`].
pub const ENV_EXECUTE_NON_DIRTY_IF_IDLE: &str = "COALESCE_EXECUTE_NON_DIRTY_IF_IDLE";

/// Upper bound for the pacing delay (24 hours).
pub const MAX_BETWEEN_EXECUTIONS_DELAY_MS: u64 = 24 * 60 * 60 * 1000;

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Minimum delay after a run before the next non-forced run, in milliseconds.
    pub between_executions_delay_ms: u64,
    /// When false every `execute` call is treated as dirty and the cache is never used.
    pub can_be_dirty: bool,
    /// When true a non-dirty `execute` with nothing running still starts a fresh run.
    pub should_execute_non_dirty_if_nothing_running: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            between_executions_delay_ms: 0,
            can_be_dirty: true,
            should_execute_non_dirty_if_nothing_running: false,
        }
    }
}

impl SchedulerConfig {
    /// Pacing delay as a [`Duration`].
    pub const fn between_executions_delay(&self) -> Duration {
        Duration::from_millis(self.between_executions_delay_ms)
    }

    /// Set the pacing delay in milliseconds.
    #[must_use]
    pub const fn with_between_executions_delay_ms(mut self, delay_ms: u64) -> Self {
        self.between_executions_delay_ms = delay_ms;
        self
    }

    /// Set whether non-dirty requests may use the cached result.
    #[must_use]
    pub const fn with_can_be_dirty(mut self, can_be_dirty: bool) -> Self {
        self.can_be_dirty = can_be_dirty;
        self
    }

    /// Set whether a non-dirty request on an idle scheduler starts a fresh run.
    #[must_use]
    pub const fn with_execute_non_dirty_if_nothing_running(mut self, enabled: bool) -> Self {
        self.should_execute_non_dirty_if_nothing_running = enabled;
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.between_executions_delay_ms > MAX_BETWEEN_EXECUTIONS_DELAY_MS {
            return Err(format!(
                "between_executions_delay_ms must be at most {MAX_BETWEEN_EXECUTIONS_DELAY_MS}"
            ));
        }
        Ok(())
    }

    /// Parse scheduler configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from the process environment, reading a `.env`
    /// file first if one exists. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, String> {
        // A missing .env file is not an error.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup and validate.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(raw) = lookup(ENV_BETWEEN_EXECUTIONS_DELAY_MS) {
            cfg.between_executions_delay_ms = raw
                .trim()
                .parse()
                .map_err(|e| format!("{ENV_BETWEEN_EXECUTIONS_DELAY_MS}: {e}"))?;
        }
        if let Some(raw) = lookup(ENV_CAN_BE_DIRTY) {
            cfg.can_be_dirty = parse_flag(ENV_CAN_BE_DIRTY, &raw)?;
        }
        if let Some(raw) = lookup(ENV_EXECUTE_NON_DIRTY_IF_IDLE) {
            cfg.should_execute_non_dirty_if_nothing_running =
                parse_flag(ENV_EXECUTE_NON_DIRTY_IF_IDLE, &raw)?;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("{key}: expected a boolean, got `{other}`")),
    }
}
