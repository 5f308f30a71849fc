//! Configuration for the cost estimator CLI

use core_config::{ConfigError, Environment, FromEnv};
use domain_cost_estimation::EstimatorConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub estimator: EstimatorConfig,
}

impl FromEnv for Config {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            environment: Environment::from_env(),
            estimator: EstimatorConfig::from_env()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        temp_env::with_vars(
            [
                ("APP_ENV", Some("production")),
                ("ESTIMATOR_DEFAULT_REGION", Some("eu-central-1")),
                ("ESTIMATOR_MAX_PARALLELISM", None),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert!(config.environment.is_production());
                assert_eq!(config.estimator.default_region, "eu-central-1");
                assert_eq!(config.estimator.max_parallelism, 8);
            },
        );
    }

    #[test]
    fn test_config_rejects_bad_estimator_settings() {
        temp_env::with_var("ESTIMATOR_REQUEST_TIMEOUT_MS", Some("soon"), || {
            assert!(Config::from_env().is_err());
        });
    }
}
