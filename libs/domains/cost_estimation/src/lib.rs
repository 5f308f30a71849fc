//! Cost Estimation Domain
//!
//! Hidden-dependency resolution and cost aggregation for cloud architecture
//! diagrams. A diagram is rebuilt into a containment tree, implicit resources
//! (an Elastic IP behind a NAT gateway, the root volume of an instance) are
//! synthesized from declarative rules, and everything is priced against a
//! time-bounded rate table.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ EstimationService│  ← Orchestration, timeouts, bounded fan-out
//! └────────┬─────────┘
//!          │
//! ┌────────▼─────────┐     ┌──────────────────────┐
//! │  DiagramGraph    │     │ RuleSet / RateTable  │  ← Per-request snapshots
//! └────────┬─────────┘     └──────────┬───────────┘
//!          │                          │
//! ┌────────▼──────────────────────────▼───┐
//! │  resolver → aggregator                │  ← Pure per-resource work
//! └────────┬──────────────────────────────┘
//!          │
//! ┌────────▼─────────┐
//! │   Repository     │  ← Reference data access (trait + in-memory)
//! └──────────────────┘
//! ```

pub mod aggregator;
pub mod config;
pub mod error;
pub mod expression;
pub mod graph;
pub mod models;
pub mod rates;
pub mod repository;
pub mod resolver;
pub mod rules;
pub mod seed;
pub mod service;

// Re-export commonly used types
pub use aggregator::{PricedResource, PricingContext, aggregate, is_hidden_component, price_resource};
pub use config::EstimatorConfig;
pub use error::{EstimationError, EstimationResult};
pub use expression::{Expression, ExpressionError, Value};
pub use graph::{DiagramGraph, NodeIndex};
pub use models::{
    ArchitectureCostEstimate, CloudProvider, CostComponent, CostStatus, CostSummary, Currency,
    DependencyRule, Diagnostic, DiagnosticKind, Diagram, DiagramEdge, DiagramNode,
    EstimateRequest, NodeData, NodeKind, PricingModel, PricingPeriod, PricingRate,
    ResourceConfig, ResourceCostEstimate, ResourceNode, ResourceType, Severity, VirtualResource,
};
pub use rates::RateTable;
pub use repository::{
    DependencyRuleRepository, InMemoryRateRepository, InMemoryRuleRepository,
    PricingRateRepository,
};
pub use resolver::{Resolution, resolve_resource};
pub use rules::{CompiledRule, RuleSet};
pub use service::EstimationService;
