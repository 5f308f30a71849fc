use futures::future::try_join_all;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::EstimationResult;
use crate::expression::{Expression, ExpressionError};
use crate::models::{CloudProvider, DependencyRule, ResourceType};
use crate::repository::DependencyRuleRepository;

/// A rule with its expressions parsed once per request.
///
/// Parse failures are kept rather than raised: the rule is skipped (with a
/// diagnostic) for each resource it would have applied to.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: Arc<DependencyRule>,
    pub condition: Result<Expression, ExpressionError>,
    pub quantity: Result<Expression, ExpressionError>,
}

impl CompiledRule {
    pub fn compile(rule: DependencyRule) -> Self {
        let condition = Expression::parse(&rule.condition_expression);
        let quantity = Expression::parse(&rule.quantity_expression);
        if let Err(e) = condition.as_ref().and(quantity.as_ref()) {
            warn!(rule = %rule.describe(), error = %e, "Dependency rule has an invalid expression");
        }
        Self {
            rule: Arc::new(rule),
            condition,
            quantity,
        }
    }
}

/// Immutable snapshot of the dependency rules used by one request
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    by_parent: HashMap<ResourceType, Vec<CompiledRule>>,
}

impl RuleSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile and group rules by parent type, ordered deterministically
    pub fn from_rules(rules: impl IntoIterator<Item = DependencyRule>) -> Self {
        let mut by_parent: HashMap<ResourceType, Vec<DependencyRule>> = HashMap::new();
        for rule in rules {
            by_parent
                .entry(rule.parent_resource_type)
                .or_default()
                .push(rule);
        }

        let by_parent = by_parent
            .into_iter()
            .map(|(parent, mut rules)| {
                rules.sort_by(|a, b| {
                    (
                        a.child_resource_type,
                        &a.description,
                        &a.condition_expression,
                        &a.quantity_expression,
                    )
                        .cmp(&(
                            b.child_resource_type,
                            &b.description,
                            &b.condition_expression,
                            &b.quantity_expression,
                        ))
                });
                (parent, rules.into_iter().map(CompiledRule::compile).collect())
            })
            .collect();

        Self { by_parent }
    }

    /// Fetch the rules for every distinct parent type, concurrently
    pub async fn load<R>(
        repository: &R,
        provider: CloudProvider,
        parent_types: impl IntoIterator<Item = ResourceType>,
    ) -> EstimationResult<Self>
    where
        R: DependencyRuleRepository + ?Sized,
    {
        let parent_types: BTreeSet<ResourceType> = parent_types
            .into_iter()
            .filter(|t| t.is_supported() && !t.is_containment())
            .collect();

        let fetched = try_join_all(
            parent_types
                .iter()
                .map(|parent| repository.list_rules(provider, *parent)),
        )
        .await?;

        let rules: Vec<DependencyRule> = fetched
            .into_iter()
            .flatten()
            .filter(|r| r.provider == provider && parent_types.contains(&r.parent_resource_type))
            .collect();

        debug!(
            provider = %provider,
            parent_types = parent_types.len(),
            rules = rules.len(),
            "Loaded dependency rules"
        );

        Ok(Self::from_rules(rules))
    }

    pub fn rules_for(&self, parent: ResourceType) -> &[CompiledRule] {
        self.by_parent.get(&parent).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Child types any rule can synthesize, for rate prefetching
    pub fn child_types(&self) -> BTreeSet<ResourceType> {
        self.by_parent
            .values()
            .flatten()
            .map(|c| c.rule.child_resource_type)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_parent.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MockDependencyRuleRepository;
    use crate::seed::builtin_dependency_rules;
    use crate::error::EstimationError;

    #[test]
    fn test_rules_grouped_and_sorted() {
        let set = RuleSet::from_rules(builtin_dependency_rules());
        let ec2 = set.rules_for(ResourceType::Ec2);
        assert_eq!(ec2.len(), 2);
        assert_eq!(ec2[0].rule.child_resource_type, ResourceType::EbsVolume);
        assert_eq!(ec2[1].rule.child_resource_type, ResourceType::NetworkInterface);
        assert!(set.rules_for(ResourceType::S3).is_empty());
        assert!(set.child_types().contains(&ResourceType::ElasticIp));
        assert_eq!(set.len(), builtin_dependency_rules().len());
    }

    #[test]
    fn test_invalid_expression_is_kept() {
        let mut rule = builtin_dependency_rules().remove(0);
        rule.condition_expression = "allocationId ==".to_string();
        let compiled = CompiledRule::compile(rule);
        assert!(compiled.condition.is_err());
        assert!(compiled.quantity.is_ok());
    }

    #[tokio::test]
    async fn test_load_queries_each_parent_type_once() {
        let mut repo = MockDependencyRuleRepository::new();
        repo.expect_list_rules()
            .times(2)
            .returning(|provider, parent| {
                Ok(builtin_dependency_rules()
                    .into_iter()
                    .filter(|r| r.provider == provider && r.parent_resource_type == parent)
                    .collect())
            });

        let set = RuleSet::load(
            &repo,
            CloudProvider::Aws,
            [
                ResourceType::Ec2,
                ResourceType::NatGateway,
                ResourceType::Ec2,
                ResourceType::Vpc,
                ResourceType::Unsupported,
            ],
        )
        .await
        .unwrap();

        assert_eq!(set.rules_for(ResourceType::Ec2).len(), 2);
        assert_eq!(set.rules_for(ResourceType::NatGateway).len(), 1);
    }

    #[tokio::test]
    async fn test_load_propagates_repository_errors() {
        let mut repo = MockDependencyRuleRepository::new();
        repo.expect_list_rules()
            .returning(|_, _| Err(EstimationError::ReferenceDataUnavailable("db down".into())));

        let result = RuleSet::load(&repo, CloudProvider::Aws, [ResourceType::Ec2]).await;
        assert!(matches!(result, Err(EstimationError::ReferenceDataUnavailable(_))));
    }
}
