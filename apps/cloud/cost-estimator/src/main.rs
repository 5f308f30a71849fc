//! Cost Estimator
//!
//! Prices an architecture diagram, including the hidden dependencies a cloud
//! provider provisions implicitly, and prints the estimate as JSON.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use core_config::FromEnv;
use core_config::tracing::{init_tracing, install_color_eyre};
use domain_cost_estimation::{
    CloudProvider, DiagramGraph, EstimateRequest, EstimationService, PricingPeriod,
};
use eyre::{Result, WrapErr};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{info, warn};

mod config;
mod reference;

use config::Config;

#[derive(Parser, Debug)]
#[command(name = "cost-estimator")]
#[command(about = "Estimate the cost of a cloud architecture diagram, hidden dependencies included")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Estimate a diagram and print the result as JSON
    Estimate {
        /// Diagram JSON file
        #[arg(short, long)]
        diagram: PathBuf,

        /// Pricing rates JSON file. Without it only built-in fallback rates apply.
        #[arg(long)]
        rates: Option<PathBuf>,

        /// Extra dependency rules JSON file
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Cloud provider (aws, azure, gcp). Defaults to ESTIMATOR_DEFAULT_PROVIDER.
        #[arg(short, long)]
        provider: Option<CloudProvider>,

        /// Default region for nodes without one. Defaults to ESTIMATOR_DEFAULT_REGION.
        #[arg(short = 'R', long)]
        region: Option<String>,

        /// Pricing period, e.g. 720h, 30d, 1w. Defaults to ESTIMATOR_DEFAULT_PERIOD.
        #[arg(long)]
        period: Option<PricingPeriod>,

        /// Instant used to select rates (RFC 3339). Defaults to now and is then
        /// left out of the output. Pin it for reproducible estimates.
        #[arg(long)]
        as_of: Option<DateTime<Utc>>,

        /// Use only the rules from --rules
        #[arg(long)]
        no_builtin_rules: bool,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,

        /// Write the Prometheus metrics to stderr when done
        #[arg(long)]
        print_metrics: bool,
    },

    /// Print the effective dependency rules
    Rules {
        /// Extra dependency rules JSON file
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Use only the rules from --rules
        #[arg(long)]
        no_builtin_rules: bool,
    },

    /// Build the containment tree only and print it in containment order
    Validate {
        /// Diagram JSON file
        #[arg(short, long)]
        diagram: PathBuf,

        /// Default region for nodes without one
        #[arg(short = 'R', long)]
        region: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();

    let config = Config::from_env()?;
    init_tracing(&config.environment);

    // Initialize metrics
    observability::init_metrics();

    let cli = Cli::parse();

    match cli.command {
        Commands::Estimate {
            diagram,
            rates,
            rules,
            provider,
            region,
            period,
            as_of,
            no_builtin_rules,
            pretty,
            print_metrics,
        } => {
            let request = EstimateRequest {
                diagram: reference::load_diagram(&diagram).await?,
                provider: provider.unwrap_or(config.estimator.default_provider),
                region: region.unwrap_or_else(|| config.estimator.default_region.clone()),
                period: period.unwrap_or(config.estimator.default_period),
                as_of,
            };

            let service = EstimationService::new(
                reference::load_rules(rules.as_deref(), !no_builtin_rules).await?,
                reference::load_rates(rates.as_deref()).await?,
                config.estimator.clone(),
            );

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, cancelling estimation");
                    let _ = shutdown_tx.send(true);
                }
            });

            info!(path = %diagram.display(), "Starting estimation");
            let estimate = service
                .estimate_with_shutdown(request, shutdown_rx)
                .await
                .wrap_err("Estimation failed")?;

            print_json(&estimate, pretty)?;

            if print_metrics {
                eprint!("{}", observability::render_metrics());
            }
        }

        Commands::Rules {
            rules,
            no_builtin_rules,
        } => {
            let repository = reference::load_rules(rules.as_deref(), !no_builtin_rules).await?;
            print_json(&repository.all().await, true)?;
        }

        Commands::Validate { diagram, region } => {
            let loaded = reference::load_diagram(&diagram).await?;
            let region = region.unwrap_or_else(|| config.estimator.default_region.clone());
            let graph = DiagramGraph::build(&loaded, &region).wrap_err("Malformed diagram")?;

            let order: Vec<_> = graph
                .containment_order()
                .iter()
                .map(|&index| {
                    let node = graph.node(index);
                    serde_json::json!({
                        "id": node.id,
                        "kind": node.kind,
                        "resourceType": node.type_label,
                        "parentId": node.parent_id,
                        "region": node.region,
                    })
                })
                .collect();

            info!(nodes = graph.len(), "Diagram is well formed");
            print_json(&order, true)?;
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<()> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", rendered);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_estimate() {
        let cli = Cli::try_parse_from([
            "cost-estimator",
            "estimate",
            "--diagram",
            "diagram.json",
            "--rates",
            "rates.json",
            "--provider",
            "AWS",
            "-R",
            "eu-west-1",
            "--period",
            "30d",
            "--as-of",
            "2025-01-01T00:00:00Z",
            "--pretty",
        ])
        .unwrap();

        match cli.command {
            Commands::Estimate {
                diagram,
                rates,
                rules,
                provider,
                region,
                period,
                as_of,
                no_builtin_rules,
                pretty,
                print_metrics,
            } => {
                assert_eq!(diagram, PathBuf::from("diagram.json"));
                assert_eq!(rates, Some(PathBuf::from("rates.json")));
                assert!(rules.is_none());
                assert_eq!(provider, Some(CloudProvider::Aws));
                assert_eq!(region.as_deref(), Some("eu-west-1"));
                assert_eq!(period.map(|p| p.hours()), Some(720));
                assert_eq!(
                    as_of.map(|t| t.to_rfc3339()).as_deref(),
                    Some("2025-01-01T00:00:00+00:00")
                );
                assert!(!no_builtin_rules);
                assert!(pretty);
                assert!(!print_metrics);
            }
            other => panic!("expected estimate, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        assert!(
            Cli::try_parse_from(["cost-estimator", "estimate", "-d", "d.json", "--period", "soon"])
                .is_err()
        );
        assert!(
            Cli::try_parse_from(["cost-estimator", "estimate", "-d", "d.json", "--provider", "oracle"])
                .is_err()
        );
        assert!(Cli::try_parse_from(["cost-estimator", "estimate"]).is_err());
    }

    #[test]
    fn test_parse_rules_and_validate() {
        let cli = Cli::try_parse_from(["cost-estimator", "rules", "--no-builtin-rules"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Rules {
                rules: None,
                no_builtin_rules: true
            }
        ));

        let cli = Cli::try_parse_from(["cost-estimator", "validate", "-d", "d.json"]).unwrap();
        assert!(matches!(cli.command, Commands::Validate { region: None, .. }));
    }
}
