use thiserror::Error;

use crate::expression::ExpressionError;
use crate::models::{CloudProvider, ResourceType};

/// Result type for estimation operations
pub type EstimationResult<T> = Result<T, EstimationError>;

/// Errors that can occur while estimating an architecture
#[derive(Debug, Error)]
pub enum EstimationError {
    /// The diagram cannot be turned into a containment tree
    #[error("Malformed graph at node '{node_id}': {reason}")]
    MalformedGraph { node_id: String, reason: String },

    /// A condition or quantity expression could not be parsed or evaluated
    #[error("Expression evaluation failed: {0}")]
    ExpressionEvaluation(#[from] ExpressionError),

    /// Neither the rate snapshot nor the built-in table has a rate
    #[error("No pricing rate for {provider}/{resource_type} in region '{region}'")]
    PricingRateNotFound {
        provider: CloudProvider,
        resource_type: ResourceType,
        region: String,
    },

    /// Rules or rates could not be loaded
    #[error("Reference data unavailable: {0}")]
    ReferenceDataUnavailable(String),

    /// The request was cancelled or ran past its deadline
    #[error("Estimation cancelled")]
    Cancelled,

    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EstimationError {
    /// Short, stable label used for metrics
    pub fn code(&self) -> &'static str {
        match self {
            EstimationError::MalformedGraph { .. } => "malformed_graph",
            EstimationError::ExpressionEvaluation(_) => "expression_evaluation",
            EstimationError::PricingRateNotFound { .. } => "pricing_rate_not_found",
            EstimationError::ReferenceDataUnavailable(_) => "reference_data_unavailable",
            EstimationError::Cancelled => "cancelled",
            EstimationError::InvalidInput(_) => "invalid_input",
            EstimationError::Serialization(_) => "serialization",
            EstimationError::Internal(_) => "internal",
        }
    }

    pub(crate) fn malformed(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        EstimationError::MalformedGraph {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }
}
