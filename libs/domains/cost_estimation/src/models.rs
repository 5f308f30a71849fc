use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use strum::{Display, EnumIter, EnumString};

use crate::error::EstimationError;

/// Heterogeneous key/value configuration attached to a diagram node
pub type ResourceConfig = serde_json::Map<String, serde_json::Value>;

/// Decimal places kept on every component subtotal
pub const SUBTOTAL_PRECISION: u32 = 6;

/// Cloud provider enumeration
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum CloudProvider {
    #[default]
    Aws,
    Azure,
    Gcp,
}

/// Unit basis of a pricing rate
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PricingModel {
    #[default]
    PerHour,
    PerGb,
    PerRequest,
    Flat,
}

/// Currency enumeration
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    Default,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Usd,
    Eur,
    Gbp,
}

/// Whether a diagram node groups other nodes or is a billable resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NodeKind {
    #[serde(alias = "group")]
    Container,
    Resource,
}

/// Closed vocabulary of resource types understood by the engine.
///
/// Diagram strings are parsed into this enum once, when the graph is built.
/// Anything outside the vocabulary becomes [`ResourceType::Unsupported`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ResourceType {
    Region,
    AvailabilityZone,
    Vpc,
    Subnet,
    SecurityGroup,
    InternetGateway,
    #[serde(alias = "nat")]
    #[strum(to_string = "nat_gateway", serialize = "nat")]
    NatGateway,
    #[serde(alias = "eip")]
    #[strum(to_string = "elastic_ip", serialize = "eip")]
    ElasticIp,
    #[serde(alias = "ec2_instance")]
    #[strum(to_string = "ec2", serialize = "ec2_instance")]
    Ec2,
    #[serde(alias = "ebs")]
    #[strum(to_string = "ebs_volume", serialize = "ebs")]
    EbsVolume,
    #[serde(alias = "eni")]
    #[strum(to_string = "network_interface", serialize = "eni")]
    NetworkInterface,
    #[serde(alias = "alb", alias = "elb", alias = "nlb")]
    #[strum(to_string = "load_balancer", serialize = "alb", serialize = "elb", serialize = "nlb")]
    LoadBalancer,
    LoadBalancerCapacityUnit,
    #[serde(alias = "rds_instance")]
    #[strum(to_string = "rds", serialize = "rds_instance")]
    Rds,
    RdsStorage,
    #[serde(alias = "s3_bucket")]
    #[strum(to_string = "s3", serialize = "s3_bucket")]
    S3,
    #[serde(alias = "lambda_function")]
    #[strum(to_string = "lambda", serialize = "lambda_function")]
    Lambda,
    #[serde(alias = "eks")]
    #[strum(to_string = "eks_cluster", serialize = "eks")]
    EksCluster,
    CloudwatchLogGroup,
    Unsupported,
}

/// Config field read for a real resource's base quantity, and its default
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseQuantity {
    pub field: Option<&'static str>,
    pub default: i64,
}

impl ResourceType {
    /// Parse a diagram label, mapping unknown labels to `Unsupported`
    pub fn from_label(label: &str) -> Self {
        Self::from_str(label.trim()).unwrap_or(Self::Unsupported)
    }

    /// Containment types group other nodes and are never priced on their own
    pub fn is_containment(&self) -> bool {
        matches!(
            self,
            Self::Region | Self::AvailabilityZone | Self::Vpc | Self::Subnet | Self::SecurityGroup
        )
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported)
    }

    /// Human-readable name of the cost component this type produces
    pub fn component_name(&self) -> &'static str {
        match self {
            Self::Region => "Region",
            Self::AvailabilityZone => "Availability Zone",
            Self::Vpc => "VPC",
            Self::Subnet => "Subnet",
            Self::SecurityGroup => "Security Group",
            Self::InternetGateway => "Internet Gateway",
            Self::NatGateway => "NAT Gateway Hourly",
            Self::ElasticIp => "Elastic IP Address",
            Self::Ec2 => "EC2 Instance Hourly",
            Self::EbsVolume => "EBS Volume Storage",
            Self::NetworkInterface => "Network Interface",
            Self::LoadBalancer => "Load Balancer Hourly",
            Self::LoadBalancerCapacityUnit => "Load Balancer Capacity Units",
            Self::Rds => "RDS Instance Hourly",
            Self::RdsStorage => "RDS Storage",
            Self::S3 => "S3 Storage",
            Self::Lambda => "Lambda Requests",
            Self::EksCluster => "EKS Control Plane Hourly",
            Self::CloudwatchLogGroup => "CloudWatch Logs Ingestion",
            Self::Unsupported => "Unsupported Resource",
        }
    }

    /// Where a real (user-modelled) resource of this type takes its quantity from
    pub fn base_quantity(&self) -> BaseQuantity {
        let (field, default) = match self {
            Self::Region
            | Self::AvailabilityZone
            | Self::Vpc
            | Self::Subnet
            | Self::SecurityGroup
            | Self::InternetGateway
            | Self::Unsupported => (None, 1),
            Self::NatGateway
            | Self::ElasticIp
            | Self::Ec2
            | Self::NetworkInterface
            | Self::LoadBalancer
            | Self::Rds
            | Self::EksCluster => (Some("count"), 1),
            Self::EbsVolume => (Some("size_gb"), 8),
            Self::LoadBalancerCapacityUnit => (Some("expected_lcu"), 1),
            Self::RdsStorage => (Some("allocated_storage"), 20),
            Self::S3 => (Some("storage_gb"), 0),
            Self::Lambda => (Some("requests"), 0),
            Self::CloudwatchLogGroup => (Some("log_gb_per_month"), 0),
        };
        BaseQuantity { field, default }
    }
}

/// A pricing duration, in whole hours.
///
/// Written as `"720h"`, `"30d"`, `"1w"` or a bare number of hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PricingPeriod {
    hours: u32,
}

impl PricingPeriod {
    /// The conventional 30-day billing month
    pub const MONTH: PricingPeriod = PricingPeriod { hours: 720 };

    pub fn from_hours(hours: u32) -> Result<Self, EstimationError> {
        if hours == 0 {
            return Err(EstimationError::InvalidInput(
                "pricing period must be at least one hour".to_string(),
            ));
        }
        Ok(Self { hours })
    }

    pub fn hours(&self) -> u32 {
        self.hours
    }

    pub fn hours_decimal(&self) -> Decimal {
        Decimal::from(self.hours)
    }
}

impl Default for PricingPeriod {
    fn default() -> Self {
        Self::MONTH
    }
}

impl fmt::Display for PricingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}h", self.hours)
    }
}

impl FromStr for PricingPeriod {
    type Err = EstimationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (digits, multiplier) = match s.char_indices().last() {
            Some((i, 'h')) | Some((i, 'H')) => (&s[..i], 1),
            Some((i, 'd')) | Some((i, 'D')) => (&s[..i], 24),
            Some((i, 'w')) | Some((i, 'W')) => (&s[..i], 24 * 7),
            _ => (s, 1),
        };
        let value: u32 = digits.trim().parse().map_err(|_| {
            EstimationError::InvalidInput(format!("invalid pricing period '{}'", s))
        })?;
        let hours = value.checked_mul(multiplier).ok_or_else(|| {
            EstimationError::InvalidInput(format!("pricing period '{}' is too long", s))
        })?;
        Self::from_hours(hours)
    }
}

impl TryFrom<String> for PricingPeriod {
    type Error = EstimationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PricingPeriod> for String {
    fn from(period: PricingPeriod) -> Self {
        period.to_string()
    }
}

// ============================================================================
// Diagram input
// ============================================================================

/// A diagram as delivered by the diagram source: flat nodes plus opaque edges
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagram {
    pub nodes: Vec<DiagramNode>,
    #[serde(default)]
    pub edges: Vec<DiagramEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub data: NodeData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default)]
    pub config: ResourceConfig,
}

/// A user-drawn connection. Carried through untouched, never interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramEdge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub source: String,
    pub target: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One estimation request, as handed over by the pipeline's caller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateRequest {
    pub diagram: Diagram,
    #[serde(default)]
    pub provider: CloudProvider,
    pub region: String,
    #[serde(default)]
    pub period: PricingPeriod,
    /// Instant used to pick rates; defaults to the time of the request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_of: Option<DateTime<Utc>>,
}

// ============================================================================
// Resource tree
// ============================================================================

/// A typed node of the containment tree
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceNode {
    pub id: String,
    pub kind: NodeKind,
    pub resource_type: ResourceType,
    /// The label the diagram used for the type, kept for output
    pub type_label: String,
    pub name: String,
    pub config: ResourceConfig,
    pub parent_id: Option<String>,
    pub region: String,
}

impl ResourceNode {
    /// Priced nodes: resource kind and not a containment type. A security
    /// group drawn as a resource node is still free structure.
    pub fn is_billable(&self) -> bool {
        self.kind == NodeKind::Resource && !self.resource_type.is_containment()
    }
}

// ============================================================================
// Reference data
// ============================================================================

/// A declared hidden dependency: creating `parent_resource_type` implicitly
/// creates `child_resource_type`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyRule {
    #[serde(default)]
    pub provider: CloudProvider,
    pub parent_resource_type: ResourceType,
    pub child_resource_type: ResourceType,
    #[serde(default)]
    pub quantity_expression: String,
    #[serde(default)]
    pub condition_expression: String,
    /// Quantity used when the quantity expression is empty or evaluates to absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_quantity: Option<Decimal>,
    #[serde(default)]
    pub is_attached: bool,
    #[serde(default)]
    pub description: String,
}

impl DependencyRule {
    /// Short identifier used in logs and diagnostics
    pub fn describe(&self) -> String {
        format!("{}->{}", self.parent_resource_type, self.child_resource_type)
    }
}

/// A unit price for a resource type, scoped by region and validity window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingRate {
    #[serde(default)]
    pub provider: CloudProvider,
    pub resource_type: ResourceType,
    /// `None` means the provider-wide default for all regions
    #[serde(default)]
    pub region: Option<String>,
    pub pricing_model: PricingModel,
    pub unit_rate: Decimal,
    #[serde(default)]
    pub currency: Currency,
    pub effective_from: DateTime<Utc>,
    /// `None` means open-ended
    #[serde(default)]
    pub effective_to: Option<DateTime<Utc>>,
}

impl PricingRate {
    /// Whether `[effective_from, effective_to)` contains `at`
    pub fn is_effective_at(&self, at: DateTime<Utc>) -> bool {
        self.effective_from <= at && self.effective_to.is_none_or(|to| at < to)
    }

    pub fn is_region_specific(&self) -> bool {
        self.region.is_some()
    }
}

/// In-memory stand-in for a resource the provider creates implicitly
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualResource {
    /// Id of the real resource that caused this one to exist
    pub origin_id: String,
    pub resource_type: ResourceType,
    pub quantity: Decimal,
    pub is_attached: bool,
    pub region: String,
    pub rule: Arc<DependencyRule>,
}

// ============================================================================
// Estimates
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostComponent {
    #[serde(rename = "componentName")]
    pub name: String,
    #[serde(rename = "model")]
    pub pricing_model: PricingModel,
    pub quantity: Decimal,
    pub unit_rate: Decimal,
    pub subtotal: Decimal,
}

/// How much of a resource's cost could be determined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CostStatus {
    Complete,
    /// Some hidden dependencies were skipped or could not be priced
    Partial,
    /// No base rate, or an unsupported resource type
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCostEstimate {
    pub resource_id: String,
    pub resource_name: String,
    pub resource_type: String,
    #[serde(rename = "breakdown")]
    pub components: Vec<CostComponent>,
    pub total_cost: Decimal,
    pub currency: Currency,
    pub status: CostStatus,
    pub cost_unknown: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostSummary {
    pub base_cost: Decimal,
    pub hidden_cost: Decimal,
    pub resource_count: usize,
    pub partial_count: usize,
    pub unknown_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchitectureCostEstimate {
    pub resource_estimates: Vec<ResourceCostEstimate>,
    pub total_cost: Decimal,
    pub currency: Currency,
    pub provider: CloudProvider,
    pub region: String,
    pub period: PricingPeriod,
    /// Present only when the request pinned it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_of: Option<DateTime<Utc>>,
    pub summary: CostSummary,
    pub diagnostics: Vec<Diagnostic>,
}

// ============================================================================
// Diagnostics
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiagnosticKind {
    ExpressionEvaluation,
    MissingQuantity,
    InvalidQuantity,
    PricingRateNotFound,
    UnsupportedResourceType,
    UnsupportedCurrency,
    ReferenceDataUnavailable,
}

/// A non-fatal problem found while estimating
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_resource_type: Option<ResourceType>,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            kind,
            resource_id: None,
            child_resource_type: None,
            message: message.into(),
        }
    }

    pub fn error(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            ..Self::warning(kind, message)
        }
    }

    pub fn for_resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn for_child(mut self, child: ResourceType) -> Self {
        self.child_resource_type = Some(child);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_type_aliases() {
        assert_eq!(ResourceType::from_label("ec2"), ResourceType::Ec2);
        assert_eq!(ResourceType::from_label("ec2_instance"), ResourceType::Ec2);
        assert_eq!(ResourceType::from_label("NAT_GATEWAY"), ResourceType::NatGateway);
        assert_eq!(ResourceType::from_label("alb"), ResourceType::LoadBalancer);
        assert_eq!(ResourceType::from_label("quantum_computer"), ResourceType::Unsupported);
    }

    #[test]
    fn test_resource_type_display_is_canonical() {
        assert_eq!(ResourceType::Ec2.to_string(), "ec2");
        assert_eq!(ResourceType::EbsVolume.to_string(), "ebs_volume");
        assert_eq!(ResourceType::LoadBalancer.to_string(), "load_balancer");
        assert_eq!(ResourceType::CloudwatchLogGroup.to_string(), "cloudwatch_log_group");
    }

    #[test]
    fn test_resource_type_serde_matches_display() {
        let json = serde_json::to_string(&ResourceType::NatGateway).unwrap();
        assert_eq!(json, "\"nat_gateway\"");
        let parsed: ResourceType = serde_json::from_str("\"ebs\"").unwrap();
        assert_eq!(parsed, ResourceType::EbsVolume);
    }

    #[test]
    fn test_containment_types() {
        assert!(ResourceType::Vpc.is_containment());
        assert!(ResourceType::Subnet.is_containment());
        assert!(!ResourceType::Ec2.is_containment());
    }

    #[test]
    fn test_pricing_period_parsing() {
        assert_eq!("720h".parse::<PricingPeriod>().unwrap().hours(), 720);
        assert_eq!("30d".parse::<PricingPeriod>().unwrap().hours(), 720);
        assert_eq!("1w".parse::<PricingPeriod>().unwrap().hours(), 168);
        assert_eq!("24".parse::<PricingPeriod>().unwrap().hours(), 24);
        assert!("0h".parse::<PricingPeriod>().is_err());
        assert!("soon".parse::<PricingPeriod>().is_err());
        assert!("-5h".parse::<PricingPeriod>().is_err());
    }

    #[test]
    fn test_pricing_period_serializes_as_string() {
        let json = serde_json::to_string(&PricingPeriod::MONTH).unwrap();
        assert_eq!(json, "\"720h\"");
        let parsed: PricingPeriod = serde_json::from_str("\"2d\"").unwrap();
        assert_eq!(parsed.hours(), 48);
    }

    #[test]
    fn test_rate_effective_window_is_half_open() {
        let from = "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let to = "2025-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let rate = PricingRate {
            provider: CloudProvider::Aws,
            resource_type: ResourceType::Ec2,
            region: None,
            pricing_model: PricingModel::PerHour,
            unit_rate: Decimal::new(104, 4),
            currency: Currency::Usd,
            effective_from: from,
            effective_to: Some(to),
        };

        assert!(rate.is_effective_at(from));
        assert!(!rate.is_effective_at(to));
        assert!(!rate.is_effective_at(from - chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_diagram_node_deserialization() {
        let json = r#"{
            "id": "nat-1",
            "type": "resource",
            "parentId": "subnet-public",
            "data": { "resourceType": "nat_gateway", "config": { "allocationId": null } }
        }"#;
        let node: DiagramNode = serde_json::from_str(json).unwrap();
        assert_eq!(node.kind, NodeKind::Resource);
        assert_eq!(node.parent_id.as_deref(), Some("subnet-public"));
        assert_eq!(node.data.resource_type, "nat_gateway");
        assert!(node.data.config.contains_key("allocationId"));
    }

    #[test]
    fn test_group_alias_is_container() {
        let kind: NodeKind = serde_json::from_str("\"group\"").unwrap();
        assert_eq!(kind, NodeKind::Container);
    }

    #[test]
    fn test_unknown_node_kind_is_rejected_at_deserialization() {
        let json = r#"{
            "id": "n1",
            "type": "annotation",
            "data": { "resourceType": "ec2" }
        }"#;
        let err = serde_json::from_str::<DiagramNode>(json).unwrap_err();
        assert!(err.to_string().contains("annotation"));

        let wrapped: crate::EstimationError = err.into();
        assert!(matches!(wrapped, crate::EstimationError::Serialization(_)));
    }
}
