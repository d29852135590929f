//! Workflow configuration.
//!
//! Every policy knob the engine consults (deadline, fan-out ceiling, retry
//! budgets) lives on `WorkflowConfig`, which is handed to the engine at
//! construction. Two engines with different configurations can run side by
//! side in one process.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Bounded exponential backoff policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
    /// Growth factor applied per attempt.
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Creates an exponential policy doubling from `initial_backoff`.
    pub fn exponential(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff,
            multiplier: 2.0,
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self::exponential(1, Duration::ZERO, Duration::ZERO)
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_backoff.as_secs_f64() {
            return self.max_backoff;
        }
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_backoff)
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ValidationFailed(format!(
                "{}.max_attempts must be greater than 0",
                name
            )));
        }

        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::ValidationFailed(format!(
                "{}.multiplier must be finite and at least 1.0",
                name
            )));
        }

        if self.initial_backoff > self.max_backoff {
            return Err(ConfigError::ValidationFailed(format!(
                "{}.initial_backoff cannot exceed max_backoff",
                name
            )));
        }

        Ok(())
    }
}

/// Configuration for the workflow engine.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Wall-clock budget for one run, measured from its start.
    pub deadline: Duration,
    /// Ceiling on simultaneously in-flight calculation tasks per run.
    pub max_concurrent_calculations: usize,
    /// Retry policy for each lineage recording call.
    pub lineage_retry: RetryPolicy,
    /// Retry policy for each batch calculation task.
    pub calculation_retry: RetryPolicy,
    /// Storage type of contexts built by `WorkflowEngine::context_for`.
    pub storage_type: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(15 * 60),
            max_concurrent_calculations: 40,
            lineage_retry: RetryPolicy::exponential(
                3,
                Duration::from_millis(200),
                Duration::from_secs(5),
            ),
            calculation_retry: RetryPolicy::exponential(
                3,
                Duration::from_millis(500),
                Duration::from_secs(10),
            ),
            storage_type: "s3".to_string(),
        }
    }
}

impl WorkflowConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `WORKFLOW_DEADLINE_SECS`: Run deadline in seconds (default: 900)
    /// - `WORKFLOW_MAX_CONCURRENT_CALCULATIONS`: Fan-out ceiling (default: 40)
    /// - `WORKFLOW_LINEAGE_MAX_ATTEMPTS`: Lineage attempts (default: 3)
    /// - `WORKFLOW_LINEAGE_BACKOFF_MS`: Initial lineage backoff (default: 200)
    /// - `WORKFLOW_CALCULATION_MAX_ATTEMPTS`: Calculation attempts (default: 3)
    /// - `WORKFLOW_CALCULATION_BACKOFF_MS`: Initial calculation backoff (default: 500)
    /// - `WORKFLOW_STORAGE_TYPE`: Storage type of new run contexts (default: s3)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value or the
    /// resulting configuration fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("WORKFLOW_DEADLINE_SECS") {
            let secs: u64 = parse_env_value(&val, "WORKFLOW_DEADLINE_SECS")?;
            config.deadline = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("WORKFLOW_MAX_CONCURRENT_CALCULATIONS") {
            config.max_concurrent_calculations =
                parse_env_value(&val, "WORKFLOW_MAX_CONCURRENT_CALCULATIONS")?;
        }

        if let Ok(val) = std::env::var("WORKFLOW_LINEAGE_MAX_ATTEMPTS") {
            config.lineage_retry.max_attempts =
                parse_env_value(&val, "WORKFLOW_LINEAGE_MAX_ATTEMPTS")?;
        }

        if let Ok(val) = std::env::var("WORKFLOW_LINEAGE_BACKOFF_MS") {
            let ms: u64 = parse_env_value(&val, "WORKFLOW_LINEAGE_BACKOFF_MS")?;
            config.lineage_retry.initial_backoff = Duration::from_millis(ms);
        }

        if let Ok(val) = std::env::var("WORKFLOW_CALCULATION_MAX_ATTEMPTS") {
            config.calculation_retry.max_attempts =
                parse_env_value(&val, "WORKFLOW_CALCULATION_MAX_ATTEMPTS")?;
        }

        if let Ok(val) = std::env::var("WORKFLOW_CALCULATION_BACKOFF_MS") {
            let ms: u64 = parse_env_value(&val, "WORKFLOW_CALCULATION_BACKOFF_MS")?;
            config.calculation_retry.initial_backoff = Duration::from_millis(ms);
        }

        if let Ok(val) = std::env::var("WORKFLOW_STORAGE_TYPE") {
            config.storage_type = val;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.deadline.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "deadline must be greater than 0".to_string(),
            ));
        }

        if self.max_concurrent_calculations == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_concurrent_calculations must be greater than 0".to_string(),
            ));
        }

        self.lineage_retry.validate("lineage_retry")?;
        self.calculation_retry.validate("calculation_retry")?;

        if self.storage_type.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "storage_type cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder method to set the run deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Builder method to set the fan-out ceiling.
    pub fn with_max_concurrent_calculations(mut self, max: usize) -> Self {
        self.max_concurrent_calculations = max;
        self
    }

    /// Builder method to set the lineage retry policy.
    pub fn with_lineage_retry(mut self, policy: RetryPolicy) -> Self {
        self.lineage_retry = policy;
        self
    }

    /// Builder method to set the calculation retry policy.
    pub fn with_calculation_retry(mut self, policy: RetryPolicy) -> Self {
        self.calculation_retry = policy;
        self
    }

    /// Builder method to set the storage type.
    pub fn with_storage_type(mut self, storage_type: impl Into<String>) -> Self {
        self.storage_type = storage_type.into();
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}
