//! Cost aggregation.
//!
//! Turns a resource plus its virtual children into cost components, then
//! folds per-resource estimates into the architecture total. All arithmetic
//! is fixed-point `Decimal`.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, warn};

use crate::models::{
    ArchitectureCostEstimate, CloudProvider, CostComponent, CostStatus, CostSummary, Currency,
    Diagnostic, DiagnosticKind, PricingModel, PricingPeriod, ResourceCostEstimate, ResourceNode,
    ResourceType, SUBTOTAL_PRECISION,
};
use crate::error::{EstimationError, EstimationResult};
use crate::expression::{Value, lookup};
use crate::rates::RateTable;
use crate::resolver::Resolution;

/// Everything pricing needs besides the resource itself
#[derive(Debug, Clone, Copy)]
pub struct PricingContext<'a> {
    pub rates: &'a RateTable,
    pub provider: CloudProvider,
    pub period: PricingPeriod,
    pub as_of: DateTime<Utc>,
}

/// One priced resource and the problems found while pricing it
#[derive(Debug, Clone, PartialEq)]
pub struct PricedResource {
    pub estimate: ResourceCostEstimate,
    pub diagnostics: Vec<Diagnostic>,
}

/// `quantity × unit_rate`, times the period's hours for hourly rates,
/// rounded to [`SUBTOTAL_PRECISION`] places. `None` on overflow.
pub fn component_subtotal(
    model: PricingModel,
    quantity: Decimal,
    unit_rate: Decimal,
    period: PricingPeriod,
) -> Option<Decimal> {
    let base = quantity.checked_mul(unit_rate)?;
    let subtotal = match model {
        PricingModel::PerHour => base.checked_mul(period.hours_decimal())?,
        PricingModel::PerGb | PricingModel::PerRequest | PricingModel::Flat => base,
    };
    Some(subtotal.round_dp_with_strategy(SUBTOTAL_PRECISION, RoundingStrategy::MidpointNearestEven))
}

/// Name of a hidden-dependency component: `"<name> (<child_type>)"`
pub fn hidden_component_name(child: ResourceType) -> String {
    format!("{} ({})", child.component_name(), child)
}

/// Whether a component name carries the `(child_type)` suffix
pub fn is_hidden_component(name: &str) -> bool {
    name.strip_suffix(')')
        .and_then(|rest| rest.rsplit_once(" ("))
        .is_some_and(|(_, suffix)| ResourceType::from_label(suffix).is_supported())
}

pub fn price_resource(
    node: &ResourceNode,
    resolution: Resolution,
    ctx: &PricingContext<'_>,
) -> PricedResource {
    let Resolution {
        virtual_resources,
        mut diagnostics,
        skipped,
    } = resolution;

    if !node.resource_type.is_supported() {
        warn!(resource_id = %node.id, resource_type = %node.type_label, "Unsupported resource type");
        diagnostics.push(
            Diagnostic::warning(
                DiagnosticKind::UnsupportedResourceType,
                format!("resource type '{}' is not supported", node.type_label),
            )
            .for_resource(&node.id),
        );
        return unknown(node, diagnostics);
    }

    let quantity = base_quantity(node, &mut diagnostics);
    let base = match ctx
        .rates
        .select(ctx.provider, node.resource_type, &node.region, ctx.as_of)
    {
        Ok(rate) => rate,
        Err(e) => {
            warn!(resource_id = %node.id, error = %e, "No base rate, cost unknown");
            diagnostics.push(
                Diagnostic::warning(DiagnosticKind::PricingRateNotFound, e.to_string())
                    .for_resource(&node.id),
            );
            return unknown(node, diagnostics);
        }
    };

    let Some(subtotal) = component_subtotal(base.pricing_model, quantity, base.unit_rate, ctx.period)
    else {
        diagnostics.push(overflow(node, None));
        return unknown(node, diagnostics);
    };

    let mut components = vec![CostComponent {
        name: node.resource_type.component_name().to_string(),
        pricing_model: base.pricing_model,
        quantity,
        unit_rate: base.unit_rate,
        subtotal,
    }];
    let mut degraded = skipped > 0;

    for child in &virtual_resources {
        let rate = match ctx
            .rates
            .select(ctx.provider, child.resource_type, &child.region, ctx.as_of)
        {
            Ok(rate) => rate,
            Err(e) => {
                degraded = true;
                diagnostics.push(
                    Diagnostic::warning(DiagnosticKind::PricingRateNotFound, e.to_string())
                        .for_resource(&node.id)
                        .for_child(child.resource_type),
                );
                continue;
            }
        };
        match component_subtotal(rate.pricing_model, child.quantity, rate.unit_rate, ctx.period) {
            Some(subtotal) => components.push(CostComponent {
                name: hidden_component_name(child.resource_type),
                pricing_model: rate.pricing_model,
                quantity: child.quantity,
                unit_rate: rate.unit_rate,
                subtotal,
            }),
            None => {
                degraded = true;
                diagnostics.push(overflow(node, Some(child.resource_type)));
            }
        }
    }

    let Some(total_cost) = checked_sum(components.iter().map(|c| c.subtotal)) else {
        warn!(resource_id = %node.id, "Resource total overflowed, cost unknown");
        diagnostics.push(overflow(node, None));
        return unknown(node, diagnostics);
    };
    let status = if degraded {
        CostStatus::Partial
    } else {
        CostStatus::Complete
    };

    debug!(
        resource_id = %node.id,
        components = components.len(),
        total = %total_cost,
        status = %status,
        "Priced resource"
    );

    PricedResource {
        estimate: ResourceCostEstimate {
            resource_id: node.id.clone(),
            resource_name: node.name.clone(),
            resource_type: output_type(node),
            components,
            total_cost,
            currency: Currency::Usd,
            status,
            cost_unknown: false,
        },
        diagnostics,
    }
}

/// Fold priced resources into the architecture estimate.
///
/// The total is the sum of resource totals, computed once. Diagnostics from
/// every resource and from `extra` are merged and sorted. A total or summary
/// that leaves the `Decimal` range is `InvalidInput`.
pub fn aggregate(
    priced: Vec<PricedResource>,
    extra: Vec<Diagnostic>,
    ctx: &PricingContext<'_>,
    region: &str,
) -> EstimationResult<ArchitectureCostEstimate> {
    let mut summary = CostSummary::default();
    let mut diagnostics = extra;
    let mut resource_estimates = Vec::with_capacity(priced.len());

    for PricedResource {
        estimate,
        diagnostics: resource_diagnostics,
    } in priced
    {
        summary.resource_count += 1;
        match estimate.status {
            CostStatus::Partial => summary.partial_count += 1,
            CostStatus::Unknown => summary.unknown_count += 1,
            CostStatus::Complete => {}
        }
        for component in &estimate.components {
            if is_hidden_component(&component.name) {
                accumulate(&mut summary.hidden_cost, component.subtotal, "hidden cost")?;
            } else {
                accumulate(&mut summary.base_cost, component.subtotal, "base cost")?;
            }
        }
        diagnostics.extend(resource_diagnostics);
        resource_estimates.push(estimate);
    }

    let total_cost = checked_sum(resource_estimates.iter().map(|e| e.total_cost))
        .ok_or_else(|| out_of_range("architecture total"))?;

    diagnostics.sort_by(|a, b| {
        (&a.resource_id, a.kind, a.child_resource_type, &a.message).cmp(&(
            &b.resource_id,
            b.kind,
            b.child_resource_type,
            &b.message,
        ))
    });
    diagnostics.dedup();

    Ok(ArchitectureCostEstimate {
        resource_estimates,
        total_cost,
        currency: Currency::Usd,
        provider: ctx.provider,
        region: region.to_string(),
        period: ctx.period,
        as_of: Some(ctx.as_of),
        summary,
        diagnostics,
    })
}

/// Exact sum, `None` on overflow
fn checked_sum(values: impl IntoIterator<Item = Decimal>) -> Option<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, value| acc.checked_add(value))
}

fn accumulate(total: &mut Decimal, value: Decimal, what: &str) -> EstimationResult<()> {
    *total = total.checked_add(value).ok_or_else(|| out_of_range(what))?;
    Ok(())
}

fn out_of_range(what: &str) -> EstimationError {
    EstimationError::InvalidInput(format!("{} exceeds the representable range", what))
}

/// Real-resource quantity from the type's config field, or its default
fn base_quantity(node: &ResourceNode, diagnostics: &mut Vec<Diagnostic>) -> Decimal {
    let basis = node.resource_type.base_quantity();
    let default = Decimal::from(basis.default);
    let Some(field) = basis.field else {
        return default;
    };

    let invalid = match lookup(&node.config, &[field.to_string()]) {
        Value::Absent | Value::Null => return default,
        Value::Number(n) if !n.is_sign_negative() || n.is_zero() => return n,
        Value::String(s) => match s.trim().parse::<Decimal>() {
            Ok(n) if !n.is_sign_negative() || n.is_zero() => return n,
            _ => format!("\"{}\"", s),
        },
        other => other.to_string(),
    };

    diagnostics.push(
        Diagnostic::warning(
            DiagnosticKind::InvalidQuantity,
            format!("invalid {} {}, using default {}", field, invalid, default),
        )
        .for_resource(&node.id),
    );
    default
}

fn unknown(node: &ResourceNode, diagnostics: Vec<Diagnostic>) -> PricedResource {
    PricedResource {
        estimate: ResourceCostEstimate {
            resource_id: node.id.clone(),
            resource_name: node.name.clone(),
            resource_type: output_type(node),
            components: Vec::new(),
            total_cost: Decimal::ZERO,
            currency: Currency::Usd,
            status: CostStatus::Unknown,
            cost_unknown: true,
        },
        diagnostics,
    }
}

fn overflow(node: &ResourceNode, child: Option<ResourceType>) -> Diagnostic {
    let diagnostic = Diagnostic::warning(
        DiagnosticKind::InvalidQuantity,
        "cost exceeds the representable range",
    )
    .for_resource(&node.id);
    match child {
        Some(child) => diagnostic.for_child(child),
        None => diagnostic,
    }
}

fn output_type(node: &ResourceNode) -> String {
    if node.resource_type.is_supported() {
        node.resource_type.to_string()
    } else {
        node.type_label.clone()
    }
}
