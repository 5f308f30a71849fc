use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::EstimationResult;
use crate::models::{CloudProvider, DependencyRule, PricingRate, ResourceType};
use crate::seed;

/// Read-only access to declared hidden-dependency rules
///
/// Implementations may be backed by a database table, a static file or an
/// in-memory seed. Retry and caching policy belong to the implementation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DependencyRuleRepository: Send + Sync {
    /// List every rule whose parent is `parent_type`
    async fn list_rules(
        &self,
        provider: CloudProvider,
        parent_type: ResourceType,
    ) -> EstimationResult<Vec<DependencyRule>>;
}

/// Read-only access to time-bounded unit rates
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PricingRateRepository: Send + Sync {
    /// List rates for a resource type whose region is `region` or null
    async fn list_rates(
        &self,
        provider: CloudProvider,
        resource_type: ResourceType,
        region: &str,
    ) -> EstimationResult<Vec<PricingRate>>;
}

/// In-memory implementation of DependencyRuleRepository
#[derive(Debug, Default, Clone)]
pub struct InMemoryRuleRepository {
    rules: Arc<RwLock<Vec<DependencyRule>>>,
}

impl InMemoryRuleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules(rules: Vec<DependencyRule>) -> Self {
        Self {
            rules: Arc::new(RwLock::new(rules)),
        }
    }

    /// Repository seeded with the built-in AWS rules
    pub fn with_builtin_rules() -> Self {
        Self::from_rules(seed::builtin_dependency_rules())
    }

    /// Parse a JSON array of rules (camelCase fields)
    pub fn from_json_str(json: &str) -> EstimationResult<Self> {
        let rules: Vec<DependencyRule> = serde_json::from_str(json)?;
        Ok(Self::from_rules(rules))
    }

    pub async fn extend(&self, rules: impl IntoIterator<Item = DependencyRule>) {
        self.rules.write().await.extend(rules);
    }

    /// Every stored rule, in insertion order
    pub async fn all(&self) -> Vec<DependencyRule> {
        self.rules.read().await.clone()
    }
}

#[async_trait]
impl DependencyRuleRepository for InMemoryRuleRepository {
    async fn list_rules(
        &self,
        provider: CloudProvider,
        parent_type: ResourceType,
    ) -> EstimationResult<Vec<DependencyRule>> {
        let rules = self.rules.read().await;
        Ok(rules
            .iter()
            .filter(|r| r.provider == provider && r.parent_resource_type == parent_type)
            .cloned()
            .collect())
    }
}

/// In-memory implementation of PricingRateRepository
#[derive(Debug, Default, Clone)]
pub struct InMemoryRateRepository {
    rates: Arc<RwLock<Vec<PricingRate>>>,
}

impl InMemoryRateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rates(rates: Vec<PricingRate>) -> Self {
        Self {
            rates: Arc::new(RwLock::new(rates)),
        }
    }

    /// Parse a JSON array of rates (camelCase fields)
    pub fn from_json_str(json: &str) -> EstimationResult<Self> {
        let rates: Vec<PricingRate> = serde_json::from_str(json)?;
        Ok(Self::from_rates(rates))
    }

    pub async fn len(&self) -> usize {
        self.rates.read().await.len()
    }
}

#[async_trait]
impl PricingRateRepository for InMemoryRateRepository {
    async fn list_rates(
        &self,
        provider: CloudProvider,
        resource_type: ResourceType,
        region: &str,
    ) -> EstimationResult<Vec<PricingRate>> {
        let rates = self.rates.read().await;
        Ok(rates
            .iter()
            .filter(|r| {
                r.provider == provider
                    && r.resource_type == resource_type
                    && r.region.as_deref().is_none_or(|rr| rr == region)
            })
            .cloned()
            .collect())
    }
}
