//! Loading diagrams and reference data from JSON files

use domain_cost_estimation::{Diagram, InMemoryRateRepository, InMemoryRuleRepository};
use eyre::{Result, WrapErr};
use std::path::Path;
use tracing::{debug, info};

pub async fn load_diagram(path: &Path) -> Result<Diagram> {
    let raw = read(path).await?;
    let diagram: Diagram = serde_json::from_str(&raw)
        .wrap_err_with(|| format!("Invalid diagram in {}", path.display()))?;
    debug!(
        path = %path.display(),
        nodes = diagram.nodes.len(),
        edges = diagram.edges.len(),
        "Loaded diagram"
    );
    Ok(diagram)
}

/// Dependency rules from `path`, layered on top of the built-in AWS rules
/// unless `builtin` is false
pub async fn load_rules(path: Option<&Path>, builtin: bool) -> Result<InMemoryRuleRepository> {
    let repository = if builtin {
        InMemoryRuleRepository::with_builtin_rules()
    } else {
        InMemoryRuleRepository::new()
    };

    if let Some(path) = path {
        let raw = read(path).await?;
        let custom = InMemoryRuleRepository::from_json_str(&raw)
            .wrap_err_with(|| format!("Invalid dependency rules in {}", path.display()))?;
        let rules = custom.all().await;
        info!(path = %path.display(), count = rules.len(), "Loaded dependency rules");
        repository.extend(rules).await;
    }

    Ok(repository)
}

/// Pricing rates from `path`; without a file only the built-in fallback
/// table prices resources
pub async fn load_rates(path: Option<&Path>) -> Result<InMemoryRateRepository> {
    let Some(path) = path else {
        return Ok(InMemoryRateRepository::new());
    };

    let raw = read(path).await?;
    let repository = InMemoryRateRepository::from_json_str(&raw)
        .wrap_err_with(|| format!("Invalid pricing rates in {}", path.display()))?;
    info!(path = %path.display(), count = repository.len().await, "Loaded pricing rates");
    Ok(repository)
}

async fn read(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .wrap_err_with(|| format!("Failed to read {}", path.display()))
}
