use core_config::{ConfigError, FromEnv, env_parse_or};
use std::time::Duration;

use crate::models::{CloudProvider, PricingPeriod};

/// Tuning for the estimation pipeline
#[derive(Clone, Debug, PartialEq)]
pub struct EstimatorConfig {
    /// Upper bound on resources resolved and priced at the same time
    pub max_parallelism: usize,
    /// Timeout for loading the rule and rate snapshots
    pub reference_timeout: Duration,
    /// Deadline for one request, counted from when it starts. Checked while
    /// waiting on the per-resource work.
    pub request_timeout: Duration,
    /// Continue with empty reference tables when loading fails
    pub allow_degraded: bool,
    pub default_provider: CloudProvider,
    pub default_region: String,
    pub default_period: PricingPeriod,
}

impl EstimatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_parallelism(mut self, max_parallelism: usize) -> Self {
        self.max_parallelism = max_parallelism.max(1);
        self
    }

    pub fn with_reference_timeout(mut self, timeout: Duration) -> Self {
        self.reference_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_allow_degraded(mut self, allow: bool) -> Self {
        self.allow_degraded = allow;
        self
    }
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            max_parallelism: 8,
            reference_timeout: Duration::from_millis(5_000),
            request_timeout: Duration::from_millis(30_000),
            allow_degraded: false,
            default_provider: CloudProvider::Aws,
            default_region: "us-east-1".to_string(),
            default_period: PricingPeriod::MONTH,
        }
    }
}

impl FromEnv for EstimatorConfig {
    /// Reads from environment variables with defaults:
    /// - ESTIMATOR_MAX_PARALLELISM: 8
    /// - ESTIMATOR_REFERENCE_TIMEOUT_MS: 5000
    /// - ESTIMATOR_REQUEST_TIMEOUT_MS: 30000
    /// - ESTIMATOR_ALLOW_DEGRADED: false
    /// - ESTIMATOR_DEFAULT_PROVIDER: aws
    /// - ESTIMATOR_DEFAULT_REGION: us-east-1
    /// - ESTIMATOR_DEFAULT_PERIOD: 720h
    fn from_env() -> Result<Self, ConfigError> {
        let max_parallelism: usize = env_parse_or("ESTIMATOR_MAX_PARALLELISM", "8")?;
        if max_parallelism == 0 {
            return Err(ConfigError::ParseError {
                key: "ESTIMATOR_MAX_PARALLELISM".to_string(),
                details: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            max_parallelism,
            reference_timeout: Duration::from_millis(env_parse_or(
                "ESTIMATOR_REFERENCE_TIMEOUT_MS",
                "5000",
            )?),
            request_timeout: Duration::from_millis(env_parse_or(
                "ESTIMATOR_REQUEST_TIMEOUT_MS",
                "30000",
            )?),
            allow_degraded: env_parse_or("ESTIMATOR_ALLOW_DEGRADED", "false")?,
            default_provider: env_parse_or("ESTIMATOR_DEFAULT_PROVIDER", "aws")?,
            default_region: env_parse_or("ESTIMATOR_DEFAULT_REGION", "us-east-1")?,
            default_period: env_parse_or("ESTIMATOR_DEFAULT_PERIOD", "720h")?,
        })
    }
}
