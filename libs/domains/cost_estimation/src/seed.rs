//! Built-in reference data: AWS hidden-dependency rules and the static
//! fallback rate table (on-demand list prices for us-east-1).

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::models::{
    CloudProvider, Currency, DependencyRule, PricingModel, PricingRate, ResourceType,
};

fn rule(
    parent: ResourceType,
    child: ResourceType,
    condition: &str,
    quantity: &str,
    default_quantity: Option<i64>,
    is_attached: bool,
    description: &str,
) -> DependencyRule {
    DependencyRule {
        provider: CloudProvider::Aws,
        parent_resource_type: parent,
        child_resource_type: child,
        quantity_expression: quantity.to_string(),
        condition_expression: condition.to_string(),
        default_quantity: default_quantity.map(Decimal::from),
        is_attached,
        description: description.to_string(),
    }
}

/// The AWS hidden dependencies known out of the box
pub fn builtin_dependency_rules() -> Vec<DependencyRule> {
    use ResourceType::*;

    vec![
        rule(
            NatGateway,
            ElasticIp,
            "allocationId == null",
            "1",
            None,
            false,
            "A NAT gateway without an explicit allocation provisions and bills its own Elastic IP",
        ),
        rule(
            Ec2,
            EbsVolume,
            "",
            "root_volume.size_gb",
            Some(8),
            true,
            "Every EC2 instance boots from a root EBS volume",
        ),
        rule(
            Ec2,
            NetworkInterface,
            "",
            "1",
            None,
            true,
            "Every EC2 instance gets a primary network interface",
        ),
        rule(
            Rds,
            RdsStorage,
            "",
            "allocated_storage",
            Some(20),
            true,
            "RDS instances bill their allocated storage separately",
        ),
        rule(
            LoadBalancer,
            LoadBalancerCapacityUnit,
            "type != \"classic\"",
            "expected_lcu",
            Some(1),
            true,
            "Application and network load balancers bill capacity units",
        ),
        rule(
            Lambda,
            CloudwatchLogGroup,
            "logging != false",
            "log_gb_per_month",
            None,
            true,
            "Lambda functions write to a CloudWatch log group",
        ),
        rule(
            EksCluster,
            CloudwatchLogGroup,
            "control_plane_logging == true",
            "log_gb_per_month",
            Some(1),
            true,
            "EKS control plane logging ships to CloudWatch",
        ),
    ]
}

static FALLBACK_RATES: Lazy<HashMap<(CloudProvider, ResourceType), PricingRate>> =
    Lazy::new(|| {
        use PricingModel::*;
        use ResourceType::*;

        let table = [
            (NatGateway, PerHour, Decimal::new(45, 3)),
            (ElasticIp, PerHour, Decimal::new(5, 3)),
            (Ec2, PerHour, Decimal::new(104, 4)),
            (EbsVolume, PerGb, Decimal::new(8, 2)),
            (NetworkInterface, Flat, Decimal::ZERO),
            (InternetGateway, Flat, Decimal::ZERO),
            (LoadBalancer, PerHour, Decimal::new(225, 4)),
            (LoadBalancerCapacityUnit, PerHour, Decimal::new(8, 3)),
            (Rds, PerHour, Decimal::new(17, 3)),
            (RdsStorage, PerGb, Decimal::new(115, 3)),
            (S3, PerGb, Decimal::new(23, 3)),
            (Lambda, PerRequest, Decimal::new(2, 7)),
            (EksCluster, PerHour, Decimal::new(10, 2)),
            (CloudwatchLogGroup, PerGb, Decimal::new(50, 2)),
        ];

        table
            .into_iter()
            .map(|(resource_type, pricing_model, unit_rate)| {
                let rate = PricingRate {
                    provider: CloudProvider::Aws,
                    resource_type,
                    region: None,
                    pricing_model,
                    unit_rate,
                    currency: Currency::Usd,
                    effective_from: DateTime::<Utc>::UNIX_EPOCH,
                    effective_to: None,
                };
                ((CloudProvider::Aws, resource_type), rate)
            })
            .collect()
    });

/// Static fallback rate keyed by `(provider, resource_type)`
pub fn builtin_fallback_rate(
    provider: CloudProvider,
    resource_type: ResourceType,
) -> Option<&'static PricingRate> {
    FALLBACK_RATES.get(&(provider, resource_type))
}
