use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

use crate::error::{EstimationError, EstimationResult};
use crate::models::{
    CloudProvider, Currency, Diagnostic, DiagnosticKind, PricingRate, ResourceType,
};
use crate::repository::PricingRateRepository;
use crate::seed;

/// Immutable per-request snapshot of pricing rates.
///
/// Loaded once before the per-resource fan-out and only read afterwards.
#[derive(Debug, Clone, Default)]
pub struct RateTable {
    rates: HashMap<(CloudProvider, ResourceType), Vec<PricingRate>>,
    diagnostics: Vec<Diagnostic>,
}

impl RateTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a table from already-fetched rates. Non-USD rates are dropped
    /// and reported through [`RateTable::diagnostics`].
    pub fn from_rates(rates: impl IntoIterator<Item = PricingRate>) -> Self {
        let mut table = Self::default();
        for rate in rates {
            if rate.currency != Currency::Usd {
                warn!(
                    resource_type = %rate.resource_type,
                    currency = %rate.currency,
                    "Ignoring non-USD pricing rate"
                );
                table.diagnostics.push(
                    Diagnostic::warning(
                        DiagnosticKind::UnsupportedCurrency,
                        format!(
                            "ignored {} rate for {} in region {}",
                            rate.currency,
                            rate.resource_type,
                            rate.region.as_deref().unwrap_or("*")
                        ),
                    )
                    .for_child(rate.resource_type),
                );
                continue;
            }
            table
                .rates
                .entry((rate.provider, rate.resource_type))
                .or_default()
                .push(rate);
        }

        for candidates in table.rates.values_mut() {
            candidates.sort_by(|a, b| {
                (&a.region, a.effective_from, a.effective_to, a.pricing_model, a.unit_rate).cmp(&(
                    &b.region,
                    b.effective_from,
                    b.effective_to,
                    b.pricing_model,
                    b.unit_rate,
                ))
            });
            candidates.dedup();
        }
        table.diagnostics.sort_by(|a, b| a.message.cmp(&b.message));
        table.diagnostics.dedup();
        table
    }

    /// Fetch every distinct `(resource_type, region)` key concurrently
    pub async fn load<P>(
        repository: &P,
        provider: CloudProvider,
        keys: impl IntoIterator<Item = (ResourceType, String)>,
    ) -> EstimationResult<Self>
    where
        P: PricingRateRepository + ?Sized,
    {
        let keys: BTreeSet<(ResourceType, String)> = keys
            .into_iter()
            .filter(|(t, _)| t.is_supported() && !t.is_containment())
            .collect();

        let fetched = try_join_all(
            keys.iter()
                .map(|(resource_type, region)| repository.list_rates(provider, *resource_type, region)),
        )
        .await?;

        let rates: Vec<PricingRate> = fetched
            .into_iter()
            .zip(&keys)
            .flat_map(|(rates, (resource_type, _))| {
                rates
                    .into_iter()
                    .filter(move |r| r.provider == provider && r.resource_type == *resource_type)
            })
            .collect();

        debug!(
            provider = %provider,
            keys = keys.len(),
            rates = rates.len(),
            "Loaded pricing rates"
        );

        Ok(Self::from_rates(rates))
    }

    /// Select exactly one rate for a lookup.
    ///
    /// Candidates must be effective at `as_of` and either match `region` or be
    /// region-less. A region match beats a default, then the latest
    /// `effective_from` wins. With no candidate the built-in table is used.
    pub fn select(
        &self,
        provider: CloudProvider,
        resource_type: ResourceType,
        region: &str,
        as_of: DateTime<Utc>,
    ) -> EstimationResult<&PricingRate> {
        let best = self
            .rates
            .get(&(provider, resource_type))
            .into_iter()
            .flatten()
            .filter(|r| r.is_effective_at(as_of))
            .filter(|r| r.region.as_deref().is_none_or(|rr| rr == region))
            .max_by_key(|r| (r.is_region_specific(), r.effective_from));

        if let Some(rate) = best {
            return Ok(rate);
        }

        seed::builtin_fallback_rate(provider, resource_type)
            .filter(|r| r.is_effective_at(as_of))
            .ok_or_else(|| EstimationError::PricingRateNotFound {
                provider,
                resource_type,
                region: region.to_string(),
            })
    }

    /// Problems found while building the snapshot
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn len(&self) -> usize {
        self.rates.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
