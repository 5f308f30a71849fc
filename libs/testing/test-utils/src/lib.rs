//! Shared test utilities for the cost estimation workspace
//!
//! This crate provides reusable test infrastructure for domain and app tests:
//! - `DiagramBuilder`: fluent construction of diagrams and estimate requests
//! - `TestDataBuilder`: deterministic test data generation
//! - `fixtures`: pricing rates and rules in a single line
//! - `assertions`: decimal and estimate assertion helpers
//!
//! # Usage
//!
//! ```rust,ignore
//! use test_utils::{DiagramBuilder, assertions::assert_decimal_eq};
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn nat_gateway_costs() {
//!     let request = DiagramBuilder::new()
//!         .container("vpc", "vpc", None)
//!         .resource("nat-1", "nat_gateway", Some("vpc"), json!({}))
//!         .request("us-east-1");
//!
//!     let estimate = service.estimate(request).await.unwrap();
//!     assert_decimal_eq(estimate.total_cost, "36.00", "nat total");
//! }
//! ```

use chrono::{DateTime, Duration, Utc};
use domain_cost_estimation::{
    CloudProvider, Diagram, DiagramEdge, DiagramNode, EstimateRequest, NodeData, NodeKind,
    PricingPeriod,
};

/// Instant used by `DiagramBuilder::request`, so rate selection is reproducible
pub const FIXED_AS_OF: &str = "2025-01-01T00:00:00Z";

/// Fluent builder for diagrams
#[derive(Debug, Clone, Default)]
pub struct DiagramBuilder {
    nodes: Vec<DiagramNode>,
    edges: Vec<DiagramEdge>,
}

impl DiagramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a containment node
    pub fn container(self, id: &str, resource_type: &str, parent: Option<&str>) -> Self {
        self.node(NodeKind::Container, id, resource_type, parent, serde_json::Value::Null)
    }

    /// Add a billable resource node; `config` must be a JSON object or null
    pub fn resource(
        self,
        id: &str,
        resource_type: &str,
        parent: Option<&str>,
        config: serde_json::Value,
    ) -> Self {
        self.node(NodeKind::Resource, id, resource_type, parent, config)
    }

    /// Set an explicit region on the most recently added node
    pub fn in_region(mut self, region: &str) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.data.region = Some(region.to_string());
        }
        self
    }

    /// Set a label on the most recently added node
    pub fn labelled(mut self, label: &str) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.data.label = Some(label.to_string());
        }
        self
    }

    /// Add a user-drawn edge
    pub fn edge(mut self, source: &str, target: &str) -> Self {
        self.edges.push(DiagramEdge {
            id: Some(format!("{}->{}", source, target)),
            source: source.to_string(),
            target: target.to_string(),
            extra: Default::default(),
        });
        self
    }

    pub fn build(self) -> Diagram {
        Diagram {
            nodes: self.nodes,
            edges: self.edges,
        }
    }

    /// AWS request over a 720h period, pinned to [`FIXED_AS_OF`]
    pub fn request(self, region: &str) -> EstimateRequest {
        EstimateRequest {
            diagram: self.build(),
            provider: CloudProvider::Aws,
            region: region.to_string(),
            period: PricingPeriod::MONTH,
            as_of: Some(fixed_as_of()),
        }
    }

    fn node(
        mut self,
        kind: NodeKind,
        id: &str,
        resource_type: &str,
        parent: Option<&str>,
        config: serde_json::Value,
    ) -> Self {
        let config = match config {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => Default::default(),
            other => panic!("node config must be an object, got {}", other),
        };
        self.nodes.push(DiagramNode {
            id: id.to_string(),
            kind,
            parent_id: parent.map(str::to_string),
            data: NodeData {
                resource_type: resource_type.to_string(),
                label: None,
                region: None,
                config,
            },
        });
        self
    }
}

pub fn fixed_as_of() -> DateTime<Utc> {
    FIXED_AS_OF
        .parse()
        .unwrap_or_else(|e| panic!("invalid FIXED_AS_OF: {}", e))
}

/// Builder for test data with deterministic randomization
///
/// This ensures tests are reproducible by deriving all data from one seed.
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    /// Create a new builder with a seed (for deterministic tests)
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Create from test name (generates seed from test name hash)
    ///
    /// # Example
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::from_test_name("test_nat_gateway");
    /// ```
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// Generate a unique node id for testing
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::new(7);
    /// assert_eq!(builder.node_id("ec2", "web"), "ec2-7-web");
    /// ```
    pub fn node_id(&self, prefix: &str, suffix: &str) -> String {
        format!("{}-{}-{}", prefix, self.seed, suffix)
    }

    /// A deterministic instant within 2024
    pub fn as_of(&self) -> DateTime<Utc> {
        let start: DateTime<Utc> = "2024-01-01T00:00:00Z"
            .parse()
            .unwrap_or_else(|e| panic!("invalid start date: {}", e));
        start + Duration::hours((self.seed % (365 * 24)) as i64)
    }

    /// A diagram of `count` EC2 instances inside one VPC
    pub fn ec2_fleet(&self, count: usize) -> DiagramBuilder {
        let vpc = self.node_id("vpc", "main");
        (0..count).fold(
            DiagramBuilder::new().container(&vpc, "vpc", None),
            |builder, i| {
                builder.resource(
                    &self.node_id("ec2", &format!("{:03}", i)),
                    "ec2",
                    Some(&vpc),
                    serde_json::json!({ "instance_type": "t3.micro" }),
                )
            },
        )
    }
}

/// Reference data fixtures
pub mod fixtures {
    use chrono::{DateTime, Utc};
    use domain_cost_estimation::{
        CloudProvider, Currency, PricingModel, PricingRate, ResourceType,
    };
    use rust_decimal::Decimal;
    use std::str::FromStr;

    /// An open-ended USD AWS rate effective from `from`
    pub fn rate_from(
        resource_type: ResourceType,
        region: Option<&str>,
        pricing_model: PricingModel,
        unit_rate: &str,
        from: &str,
    ) -> PricingRate {
        PricingRate {
            provider: CloudProvider::Aws,
            resource_type,
            region: region.map(str::to_string),
            pricing_model,
            unit_rate: Decimal::from_str(unit_rate)
                .unwrap_or_else(|e| panic!("invalid unit rate '{}': {}", unit_rate, e)),
            currency: Currency::Usd,
            effective_from: from
                .parse::<DateTime<Utc>>()
                .unwrap_or_else(|e| panic!("invalid date '{}': {}", from, e)),
            effective_to: None,
        }
    }

    /// An open-ended USD AWS rate effective since 2024-01-01
    pub fn rate(
        resource_type: ResourceType,
        region: Option<&str>,
        pricing_model: PricingModel,
        unit_rate: &str,
    ) -> PricingRate {
        rate_from(resource_type, region, pricing_model, unit_rate, "2024-01-01T00:00:00Z")
    }
}

/// Test assertion helpers
pub mod assertions {
    use domain_cost_estimation::{ArchitectureCostEstimate, CostComponent, ResourceCostEstimate};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    /// Assert that a decimal equals the value written in `expected`
    pub fn assert_decimal_eq(actual: Decimal, expected: &str, context: &str) {
        let expected = Decimal::from_str(expected)
            .unwrap_or_else(|e| panic!("{}: invalid expected decimal '{}': {}", context, expected, e));
        assert_eq!(
            actual, expected,
            "{}: expected {}, got {}",
            context, expected, actual
        );
    }

    /// Assert that an optional value is Some
    pub fn assert_some<T>(value: Option<T>, context: &str) -> T {
        value.unwrap_or_else(|| panic!("{}: expected Some, got None", context))
    }

    /// Find a resource estimate by id
    pub fn resource<'a>(
        estimate: &'a ArchitectureCostEstimate,
        resource_id: &str,
    ) -> &'a ResourceCostEstimate {
        assert_some(
            estimate
                .resource_estimates
                .iter()
                .find(|r| r.resource_id == resource_id),
            &format!("resource '{}'", resource_id),
        )
    }

    /// Find a component by exact name
    pub fn component<'a>(resource: &'a ResourceCostEstimate, name: &str) -> &'a CostComponent {
        assert_some(
            resource.components.iter().find(|c| c.name == name),
            &format!("component '{}' of '{}'", name, resource.resource_id),
        )
    }

    /// Assert the architecture total is the exact sum of resource totals
    pub fn assert_total_is_sum(estimate: &ArchitectureCostEstimate) {
        let sum: Decimal = estimate.resource_estimates.iter().map(|r| r.total_cost).sum();
        assert_eq!(estimate.total_cost, sum, "architecture total must equal resource sum");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_builder_deterministic() {
        let builder1 = TestDataBuilder::new(42);
        let builder2 = TestDataBuilder::new(42);

        assert_eq!(builder1.as_of(), builder2.as_of());
        assert_eq!(builder1.node_id("ec2", "a"), builder2.node_id("ec2", "a"));
    }

    #[test]
    fn test_data_builder_different_names() {
        let builder1 = TestDataBuilder::from_test_name("test1");
        let builder2 = TestDataBuilder::from_test_name("test2");

        assert_ne!(builder1.node_id("ec2", "a"), builder2.node_id("ec2", "a"));
    }

    #[test]
    fn test_diagram_builder() {
        let diagram = DiagramBuilder::new()
            .container("vpc", "vpc", None)
            .in_region("eu-west-1")
            .resource("ec2-1", "ec2", Some("vpc"), serde_json::json!({ "count": 2 }))
            .labelled("Web")
            .edge("ec2-1", "vpc")
            .build();

        assert_eq!(diagram.nodes.len(), 2);
        assert_eq!(diagram.nodes[0].data.region.as_deref(), Some("eu-west-1"));
        assert_eq!(diagram.nodes[1].data.label.as_deref(), Some("Web"));
        assert_eq!(diagram.nodes[1].kind, NodeKind::Resource);
        assert_eq!(diagram.edges.len(), 1);
    }

    #[test]
    fn test_ec2_fleet() {
        let diagram = TestDataBuilder::new(1).ec2_fleet(3).build();
        assert_eq!(diagram.nodes.len(), 4);
        assert_eq!(diagram.nodes[1].parent_id.as_deref(), Some("vpc-1-main"));
    }
}
