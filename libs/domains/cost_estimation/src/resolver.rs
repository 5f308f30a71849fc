//! Hidden-dependency resolution.
//!
//! For each real resource, applicable rules are evaluated against its config
//! and produce virtual children. Virtual resources are not expanded again,
//! so work is bounded by nodes × rules-per-type.

use rust_decimal::Decimal;
use tracing::{debug, trace};

use crate::expression::ExpressionError;
use crate::models::{Diagnostic, DiagnosticKind, ResourceNode, VirtualResource};
use crate::rules::{CompiledRule, RuleSet};

/// Outcome of resolving one resource
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub virtual_resources: Vec<VirtualResource>,
    pub diagnostics: Vec<Diagnostic>,
    /// Rules that applied, or might have, but produced nothing
    pub skipped: usize,
}

impl Resolution {
    pub fn is_degraded(&self) -> bool {
        self.skipped > 0
    }
}

pub fn resolve_resource(node: &ResourceNode, rules: &RuleSet) -> Resolution {
    let mut resolution = Resolution::default();
    if !node.is_billable() {
        return resolution;
    }

    for compiled in rules.rules_for(node.resource_type) {
        match apply_rule(node, compiled) {
            Ok(Some(quantity)) => {
                let rule = &compiled.rule;
                debug!(
                    resource_id = %node.id,
                    rule = %rule.describe(),
                    quantity = %quantity,
                    "Synthesized hidden dependency"
                );
                resolution.virtual_resources.push(VirtualResource {
                    origin_id: node.id.clone(),
                    resource_type: rule.child_resource_type,
                    quantity,
                    is_attached: rule.is_attached,
                    region: node.region.clone(),
                    rule: rule.clone(),
                });
            }
            Ok(None) => {
                trace!(resource_id = %node.id, rule = %compiled.rule.describe(), "Rule condition not met");
            }
            Err(diagnostic) => {
                resolution.skipped += 1;
                resolution.diagnostics.push(diagnostic);
            }
        }
    }

    resolution
}

/// `Ok(None)` when the condition does not hold, `Err` when the rule had to be skipped
fn apply_rule(node: &ResourceNode, compiled: &CompiledRule) -> Result<Option<Decimal>, Diagnostic> {
    let rule = &compiled.rule;
    let skip = |kind: DiagnosticKind, message: String| {
        Diagnostic::warning(kind, message)
            .for_resource(&node.id)
            .for_child(rule.child_resource_type)
    };
    let expression_failed = |which: &str, e: &ExpressionError| {
        skip(
            DiagnosticKind::ExpressionEvaluation,
            format!("rule {} skipped: {} expression failed: {}", rule.describe(), which, e),
        )
    };

    let condition = compiled
        .condition
        .as_ref()
        .map_err(|e| expression_failed("condition", e))?;
    let fires = condition
        .evaluate_condition(&node.config)
        .map_err(|e| expression_failed("condition", &e))?;
    if !fires {
        return Ok(None);
    }

    let quantity = compiled
        .quantity
        .as_ref()
        .map_err(|e| expression_failed("quantity", e))?;
    match quantity.evaluate_quantity(&node.config) {
        Ok(Some(q)) => Ok(Some(q)),
        Ok(None) => rule.default_quantity.map(Some).ok_or_else(|| {
            skip(
                DiagnosticKind::MissingQuantity,
                format!(
                    "rule {} skipped: quantity '{}' is absent and the rule has no default",
                    rule.describe(),
                    quantity.source()
                ),
            )
        }),
        Err(e @ (ExpressionError::Negative(_) | ExpressionError::NotNumeric(_))) => Err(skip(
            DiagnosticKind::InvalidQuantity,
            format!("rule {} skipped: {}", rule.describe(), e),
        )),
        Err(e) => Err(expression_failed("quantity", &e)),
    }
}
