use chrono::Utc;
use observability::EstimationMetrics;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::aggregator::{PricedResource, PricingContext, aggregate, price_resource};
use crate::config::EstimatorConfig;
use crate::error::{EstimationError, EstimationResult};
use crate::graph::DiagramGraph;
use crate::models::{
    ArchitectureCostEstimate, CloudProvider, Diagnostic, DiagnosticKind, EstimateRequest,
    ResourceType,
};
use crate::rates::RateTable;
use crate::repository::{DependencyRuleRepository, PricingRateRepository};
use crate::resolver::resolve_resource;
use crate::rules::RuleSet;

/// Orchestrates one estimation: graph → reference data → per-resource
/// resolution and pricing → aggregation
#[derive(Clone)]
pub struct EstimationService<D: DependencyRuleRepository, P: PricingRateRepository> {
    rules: Arc<D>,
    rates: Arc<P>,
    config: EstimatorConfig,
}

impl<D, P> EstimationService<D, P>
where
    D: DependencyRuleRepository + 'static,
    P: PricingRateRepository + 'static,
{
    /// Create a new estimation service
    pub fn new(rules: D, rates: P, config: EstimatorConfig) -> Self {
        Self {
            rules: Arc::new(rules),
            rates: Arc::new(rates),
            config,
        }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Estimate a diagram with no external shutdown signal
    pub async fn estimate(
        &self,
        request: EstimateRequest,
    ) -> EstimationResult<ArchitectureCostEstimate> {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        self.estimate_with_shutdown(request, shutdown_rx).await
    }

    /// Estimate a diagram, aborting with `Cancelled` when `shutdown` flips to
    /// true or the request deadline passes
    #[instrument(
        skip(self, request, shutdown),
        fields(
            provider = %request.provider,
            region = %request.region,
            nodes = request.diagram.nodes.len()
        )
    )]
    pub async fn estimate_with_shutdown(
        &self,
        request: EstimateRequest,
        shutdown: watch::Receiver<bool>,
    ) -> EstimationResult<ArchitectureCostEstimate> {
        let started = Instant::now();
        let provider = request.provider;

        let result = self.run(request, shutdown).await;

        match &result {
            Ok(estimate) => {
                let status = if estimate.summary.partial_count + estimate.summary.unknown_count > 0 {
                    "partial"
                } else {
                    "complete"
                };
                EstimationMetrics::record_estimation(
                    &provider.to_string(),
                    status,
                    estimate.resource_estimates.len(),
                    started.elapsed(),
                );
                for diagnostic in &estimate.diagnostics {
                    EstimationMetrics::record_diagnostic(&diagnostic.kind.to_string());
                }
                info!(
                    resources = estimate.resource_estimates.len(),
                    total_cost = %estimate.total_cost,
                    diagnostics = estimate.diagnostics.len(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Estimation complete"
                );
            }
            Err(e) => {
                EstimationMetrics::record_estimation(
                    &provider.to_string(),
                    e.code(),
                    0,
                    started.elapsed(),
                );
                warn!(error = %e, "Estimation failed");
            }
        }

        result
    }

    async fn run(
        &self,
        request: EstimateRequest,
        mut shutdown: watch::Receiver<bool>,
    ) -> EstimationResult<ArchitectureCostEstimate> {
        let provider = request.provider;
        let period = request.period;
        let pinned_as_of = request.as_of;
        let as_of = pinned_as_of.unwrap_or_else(Utc::now);
        let region = if request.region.trim().is_empty() {
            self.config.default_region.clone()
        } else {
            request.region.trim().to_string()
        };

        let deadline = tokio::time::Instant::now() + self.config.request_timeout;

        // Structural errors abort before any reference data is touched
        let graph = Arc::new(DiagramGraph::build(&request.diagram, &region)?);
        if *shutdown.borrow() {
            return Err(EstimationError::Cancelled);
        }

        let mut diagnostics = Vec::new();
        let rules = Arc::new(self.load_rules(&graph, provider, &mut diagnostics).await?);
        let rates = Arc::new(
            self.load_rates(&graph, &rules, provider, &mut diagnostics)
                .await?,
        );
        diagnostics.extend(rates.diagnostics().iter().cloned());

        let resources: Vec<_> = graph
            .containment_order()
            .iter()
            .copied()
            .filter(|idx| graph.node(*idx).is_billable())
            .collect();
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallelism.max(1)));
        let mut join_set = JoinSet::new();

        for (position, idx) in resources.iter().copied().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let graph = Arc::clone(&graph);
            let rules = Arc::clone(&rules);
            let rates = Arc::clone(&rates);
            let shutdown = shutdown.clone();

            join_set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return Err(EstimationError::Cancelled);
                };
                if *shutdown.borrow() {
                    return Err(EstimationError::Cancelled);
                }

                let node = graph.node(idx);
                let resolution = resolve_resource(node, &rules);
                for child in &resolution.virtual_resources {
                    EstimationMetrics::record_hidden_dependency(&child.resource_type.to_string());
                }
                let ctx = PricingContext {
                    rates: &rates,
                    provider,
                    period,
                    as_of,
                };
                Ok::<_, EstimationError>((position, price_resource(node, resolution, &ctx)))
            });
        }

        let fan_in = async {
            let mut slots: Vec<Option<PricedResource>> = vec![None; resources.len()];
            while let Some(joined) = join_set.join_next().await {
                let (position, priced) = joined.map_err(|e| {
                    EstimationError::Internal(format!("resource task failed: {}", e))
                })??;
                slots[position] = Some(priced);
            }
            Ok::<_, EstimationError>(slots.into_iter().flatten().collect::<Vec<_>>())
        };

        let priced = tokio::select! {
            result = tokio::time::timeout_at(deadline, fan_in) => match result {
                Ok(priced) => priced?,
                Err(_) => {
                    warn!(
                        timeout_ms = self.config.request_timeout.as_millis() as u64,
                        "Request deadline passed, cancelling remaining work"
                    );
                    return Err(EstimationError::Cancelled);
                }
            },
            _ = shutdown_signalled(&mut shutdown) => {
                warn!("Shutdown signalled, cancelling remaining work");
                return Err(EstimationError::Cancelled);
            }
        };

        let ctx = PricingContext {
            rates: &rates,
            provider,
            period,
            as_of,
        };
        let mut estimate = aggregate(priced, diagnostics, &ctx, &region)?;
        estimate.as_of = pinned_as_of;
        Ok(estimate)
    }

    async fn load_rules(
        &self,
        graph: &DiagramGraph,
        provider: CloudProvider,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> EstimationResult<RuleSet> {
        let parent_types: Vec<ResourceType> = graph.resources().map(|n| n.resource_type).collect();
        let loaded = with_timeout(
            self.config.reference_timeout,
            "dependency rules",
            RuleSet::load(self.rules.as_ref(), provider, parent_types),
        )
        .await;

        match loaded {
            Ok(rules) => {
                debug!(rules = rules.len(), "Rule snapshot ready");
                Ok(rules)
            }
            Err(e) => self.degrade(e, diagnostics).map(|_| RuleSet::empty()),
        }
    }

    async fn load_rates(
        &self,
        graph: &DiagramGraph,
        rules: &RuleSet,
        provider: CloudProvider,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> EstimationResult<RateTable> {
        let mut keys = Vec::new();
        for node in graph.resources() {
            keys.push((node.resource_type, node.region.clone()));
            for compiled in rules.rules_for(node.resource_type) {
                keys.push((compiled.rule.child_resource_type, node.region.clone()));
            }
        }

        let loaded = with_timeout(
            self.config.reference_timeout,
            "pricing rates",
            RateTable::load(self.rates.as_ref(), provider, keys),
        )
        .await;

        match loaded {
            Ok(rates) => {
                debug!(rates = rates.len(), "Rate snapshot ready");
                Ok(rates)
            }
            Err(e) => self.degrade(e, diagnostics).map(|_| RateTable::empty()),
        }
    }

    /// In degraded mode a reference-data failure becomes a diagnostic
    fn degrade(
        &self,
        error: EstimationError,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> EstimationResult<()> {
        if !self.config.allow_degraded {
            return Err(error);
        }
        warn!(error = %error, "Continuing without reference data");
        diagnostics.push(Diagnostic::error(
            DiagnosticKind::ReferenceDataUnavailable,
            error.to_string(),
        ));
        Ok(())
    }
}

/// Run a reference-data load under a timeout, mapping every failure to
/// `ReferenceDataUnavailable`
async fn with_timeout<T>(
    timeout: Duration,
    what: &str,
    load: impl Future<Output = EstimationResult<T>>,
) -> EstimationResult<T> {
    match tokio::time::timeout(timeout, load).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(EstimationError::ReferenceDataUnavailable(reason))) => Err(
            EstimationError::ReferenceDataUnavailable(format!("{}: {}", what, reason)),
        ),
        Ok(Err(e)) => Err(EstimationError::ReferenceDataUnavailable(format!(
            "{}: {}",
            what, e
        ))),
        Err(_) => Err(EstimationError::ReferenceDataUnavailable(format!(
            "{}: timed out after {}ms",
            what,
            timeout.as_millis()
        ))),
    }
}

/// Resolves once the flag is true. Never resolves if the sender goes away.
async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
