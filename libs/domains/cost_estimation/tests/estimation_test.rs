//! End-to-end estimation tests against in-memory reference data

use domain_cost_estimation::{
    CostStatus, DiagnosticKind, EstimationError, EstimationService, EstimatorConfig,
    InMemoryRateRepository, InMemoryRuleRepository, PricingModel, ResourceType,
    is_hidden_component,
};
use serde_json::json;
use test_utils::assertions::{
    assert_decimal_eq, assert_some, assert_total_is_sum, component, resource,
};
use test_utils::fixtures::{rate, rate_from};
use test_utils::{DiagramBuilder, TestDataBuilder};

type Service = EstimationService<InMemoryRuleRepository, InMemoryRateRepository>;

fn builtin_service() -> Service {
    EstimationService::new(
        InMemoryRuleRepository::with_builtin_rules(),
        InMemoryRateRepository::new(),
        EstimatorConfig::default(),
    )
}

fn service_with_rates(rates: Vec<domain_cost_estimation::PricingRate>) -> Service {
    EstimationService::new(
        InMemoryRuleRepository::with_builtin_rules(),
        InMemoryRateRepository::from_rates(rates),
        EstimatorConfig::default(),
    )
}

#[tokio::test]
async fn nat_gateway_bills_its_implicit_elastic_ip() {
    let request = DiagramBuilder::new()
        .container("vpc", "vpc", None)
        .resource("nat-1", "nat_gateway", Some("vpc"), json!({}))
        .request("us-east-1");

    let estimate = builtin_service().estimate(request).await.unwrap();

    let nat = resource(&estimate, "nat-1");
    assert_eq!(nat.status, CostStatus::Complete);
    assert_eq!(nat.components.len(), 2);

    let base = component(nat, "NAT Gateway Hourly");
    assert!(!is_hidden_component(&base.name));
    assert_decimal_eq(base.subtotal, "32.40", "nat base");

    let eip = component(nat, "Elastic IP Address (elastic_ip)");
    assert!(is_hidden_component(&eip.name));
    assert_eq!(eip.pricing_model, PricingModel::PerHour);
    assert_decimal_eq(eip.subtotal, "3.60", "elastic ip");

    assert_decimal_eq(nat.total_cost, "36.00", "nat total");
    assert_decimal_eq(estimate.summary.hidden_cost, "3.60", "hidden cost");
    assert!(estimate.diagnostics.is_empty());
    assert_total_is_sum(&estimate);
}

#[tokio::test]
async fn nat_gateway_with_allocation_has_no_hidden_elastic_ip() {
    let request = DiagramBuilder::new()
        .resource("nat-1", "nat_gateway", None, json!({ "allocationId": "eipalloc-123" }))
        .request("us-east-1");

    let estimate = builtin_service().estimate(request).await.unwrap();

    let nat = resource(&estimate, "nat-1");
    assert_eq!(nat.components.len(), 1);
    assert_decimal_eq(nat.total_cost, "32.40", "nat total");
}

#[tokio::test]
async fn ec2_root_volume_defaults_to_eight_gigabytes() {
    let request = DiagramBuilder::new()
        .resource("web", "ec2", None, json!({ "instance_type": "t3.micro" }))
        .request("us-east-1");

    let estimate = builtin_service().estimate(request).await.unwrap();

    let web = resource(&estimate, "web");
    let ebs = component(web, "EBS Volume Storage (ebs_volume)");
    assert_decimal_eq(ebs.quantity, "8", "ebs quantity");
    assert_decimal_eq(ebs.subtotal, "0.64", "ebs subtotal");
    assert_decimal_eq(component(web, "EC2 Instance Hourly").subtotal, "7.488", "ec2 base");
    assert_decimal_eq(web.total_cost, "8.128", "ec2 total");
    assert_eq!(web.status, CostStatus::Complete);
}

#[tokio::test]
async fn ec2_root_volume_size_is_read_from_config() {
    let request = DiagramBuilder::new()
        .resource("web", "ec2", None, json!({ "root_volume": { "size_gb": 50 } }))
        .request("us-east-1");

    let estimate = builtin_service().estimate(request).await.unwrap();

    let ebs = component(resource(&estimate, "web"), "EBS Volume Storage (ebs_volume)");
    assert_decimal_eq(ebs.subtotal, "4.00", "ebs subtotal");
}

#[tokio::test]
async fn dangling_parent_fails_fast() {
    let request = DiagramBuilder::new()
        .container("vpc", "vpc", None)
        .resource("web", "ec2", Some("missing-subnet"), json!({}))
        .request("us-east-1");

    let err = builtin_service().estimate(request).await.unwrap_err();

    match err {
        EstimationError::MalformedGraph { node_id, .. } => assert_eq!(node_id, "web"),
        other => panic!("expected MalformedGraph, got {:?}", other),
    }
}

#[tokio::test]
async fn resource_without_rules_has_only_base_components() {
    let request = DiagramBuilder::new()
        .resource("assets", "s3", None, json!({ "storage_gb": 100 }))
        .request("us-east-1");

    let estimate = builtin_service().estimate(request).await.unwrap();

    let assets = resource(&estimate, "assets");
    assert_eq!(assets.components.len(), 1);
    assert!(assets.components.iter().all(|c| !is_hidden_component(&c.name)));
    assert_decimal_eq(assets.total_cost, "2.3", "s3 total");
    assert_decimal_eq(estimate.summary.hidden_cost, "0", "hidden cost");
    assert!(estimate.diagnostics.is_empty());
}

#[tokio::test]
async fn containers_are_not_priced() {
    let request = DiagramBuilder::new()
        .container("region", "region", None)
        .in_region("us-east-1")
        .container("vpc", "vpc", Some("region"))
        .container("subnet", "subnet", Some("vpc"))
        .resource("web", "ec2", Some("subnet"), json!({}))
        .request("us-east-1");

    let estimate = builtin_service().estimate(request).await.unwrap();

    assert_eq!(estimate.resource_estimates.len(), 1);
    assert_eq!(estimate.summary.resource_count, 1);
    assert_eq!(estimate.resource_estimates[0].resource_id, "web");
}

#[tokio::test]
async fn estimates_are_byte_identical_across_runs() {
    let builder = TestDataBuilder::from_test_name("estimates_are_byte_identical_across_runs");
    let diagram = builder
        .ec2_fleet(12)
        .resource("nat", "nat_gateway", None, json!({}))
        .resource("db", "rds", None, json!({ "allocated_storage": 100 }))
        .resource("logs", "lambda", None, json!({ "requests": 1000000 }))
        .resource("mystery", "quantum_computer", None, json!({}));

    let service = EstimationService::new(
        InMemoryRuleRepository::with_builtin_rules(),
        InMemoryRateRepository::new(),
        EstimatorConfig::default().with_max_parallelism(3),
    );

    let first = service.estimate(diagram.clone().request("us-east-1")).await.unwrap();
    let second = service.estimate(diagram.request("us-east-1")).await.unwrap();

    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
    assert_total_is_sum(&first);
}

#[tokio::test]
async fn region_specific_rate_wins_over_global() {
    let service = service_with_rates(vec![
        rate(ResourceType::Ec2, None, PricingModel::PerHour, "0.0104"),
        rate(ResourceType::Ec2, Some("eu-west-1"), PricingModel::PerHour, "0.0114"),
    ]);

    let request = DiagramBuilder::new()
        .resource("web", "ec2", None, json!({}))
        .request("eu-west-1");
    let estimate = service.estimate(request).await.unwrap();

    let base = component(resource(&estimate, "web"), "EC2 Instance Hourly");
    assert_decimal_eq(base.unit_rate, "0.0114", "regional rate");
    assert_decimal_eq(base.subtotal, "8.208", "regional subtotal");
}

#[tokio::test]
async fn latest_effective_rate_is_selected() {
    let service = service_with_rates(vec![
        rate_from(ResourceType::Ec2, None, PricingModel::PerHour, "0.0100", "2023-01-01T00:00:00Z"),
        rate_from(ResourceType::Ec2, None, PricingModel::PerHour, "0.0120", "2024-06-01T00:00:00Z"),
        rate_from(ResourceType::Ec2, None, PricingModel::PerHour, "0.0500", "2030-01-01T00:00:00Z"),
    ]);

    let request = DiagramBuilder::new()
        .resource("web", "ec2", None, json!({}))
        .request("us-east-1");
    let estimate = service.estimate(request).await.unwrap();

    let base = component(resource(&estimate, "web"), "EC2 Instance Hourly");
    assert_decimal_eq(base.unit_rate, "0.0120", "effective rate");
}

#[tokio::test]
async fn repository_rate_overrides_builtin_fallback() {
    let service = service_with_rates(vec![rate(
        ResourceType::NatGateway,
        None,
        PricingModel::PerHour,
        "0.050",
    )]);

    let request = DiagramBuilder::new()
        .resource("nat", "nat_gateway", None, json!({}))
        .request("us-east-1");
    let estimate = service.estimate(request).await.unwrap();

    let nat = resource(&estimate, "nat");
    assert_decimal_eq(component(nat, "NAT Gateway Hourly").subtotal, "36.00", "nat base");
    // Elastic IP still priced from the fallback table
    assert_decimal_eq(nat.total_cost, "39.60", "nat total");
}

#[tokio::test]
async fn missing_quantity_field_degrades_instead_of_failing() {
    let request = DiagramBuilder::new()
        .resource("fn", "lambda", None, json!({ "requests": 2000000 }))
        .resource("cluster", "eks", None, json!({ "control_plane_logging": true }))
        .request("us-east-1");

    let estimate = builtin_service().estimate(request).await.unwrap();

    let lambda = resource(&estimate, "fn");
    assert_eq!(lambda.status, CostStatus::Partial);
    assert_eq!(lambda.components.len(), 1);
    assert_decimal_eq(lambda.total_cost, "0.4", "lambda requests");

    let missing = assert_some(
        estimate
            .diagnostics
            .iter()
            .find(|d| d.kind == DiagnosticKind::MissingQuantity),
        "missing quantity diagnostic",
    );
    assert_eq!(missing.resource_id.as_deref(), Some("fn"));
    assert_eq!(missing.child_resource_type, Some(ResourceType::CloudwatchLogGroup));

    // EKS rule carries a default of 1 GB
    let cluster = resource(&estimate, "cluster");
    assert_eq!(cluster.status, CostStatus::Complete);
    assert_decimal_eq(
        component(cluster, "CloudWatch Logs Ingestion (cloudwatch_log_group)").subtotal,
        "0.5",
        "eks logs",
    );
    assert_eq!(estimate.summary.partial_count, 1);
    assert_total_is_sum(&estimate);
}

#[tokio::test]
async fn unsupported_type_is_unknown_not_fatal() {
    let request = DiagramBuilder::new()
        .resource("web", "ec2", None, json!({}))
        .resource("odd", "quantum_computer", None, json!({}))
        .request("us-east-1");

    let estimate = builtin_service().estimate(request).await.unwrap();

    let odd = resource(&estimate, "odd");
    assert_eq!(odd.status, CostStatus::Unknown);
    assert!(odd.cost_unknown);
    assert_eq!(odd.resource_type, "quantum_computer");
    assert_eq!(estimate.summary.unknown_count, 1);
    assert!(
        estimate
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::UnsupportedResourceType)
    );
    assert_decimal_eq(estimate.total_cost, "8.128", "total excludes unknown");
}

#[tokio::test]
async fn rules_loaded_from_json_are_applied() {
    let rules = InMemoryRuleRepository::from_json_str(
        r#"[{
            "provider": "aws",
            "parentResourceType": "s3",
            "childResourceType": "cloudwatch_log_group",
            "conditionExpression": "access_logging == true",
            "quantityExpression": "storage_gb / 100",
            "isAttached": true,
            "description": "S3 access logs"
        }]"#,
    )
    .unwrap();
    let service = EstimationService::new(rules, InMemoryRateRepository::new(), EstimatorConfig::default());

    let request = DiagramBuilder::new()
        .resource("logged", "s3", None, json!({ "storage_gb": 200, "access_logging": true }))
        .resource("quiet", "s3", None, json!({ "storage_gb": 200 }))
        .request("us-east-1");
    let estimate = service.estimate(request).await.unwrap();

    let logged = resource(&estimate, "logged");
    let logs = component(logged, "CloudWatch Logs Ingestion (cloudwatch_log_group)");
    assert_decimal_eq(logs.quantity, "2", "log quantity");
    assert_decimal_eq(logs.subtotal, "1.0", "log subtotal");
    assert_eq!(resource(&estimate, "quiet").components.len(), 1);
}

#[tokio::test]
async fn output_uses_camel_case_wire_names() {
    let request = DiagramBuilder::new()
        .resource("nat-1", "nat_gateway", None, json!({}))
        .labelled("Egress")
        .request("us-east-1");

    let estimate = builtin_service().estimate(request).await.unwrap();
    let value = serde_json::to_value(&estimate).unwrap();

    let first = &value["resourceEstimates"][0];
    assert_eq!(first["resourceId"], "nat-1");
    assert_eq!(first["resourceName"], "Egress");
    assert_eq!(first["breakdown"][0]["componentName"], "NAT Gateway Hourly");
    assert_eq!(first["breakdown"][0]["model"], "per_hour");
    assert_eq!(value["currency"], "USD");
    assert_eq!(value["period"], "720h");
    assert!(value.get("totalCost").is_some());

    let mut fields: Vec<_> = first["breakdown"][0]
        .as_object()
        .unwrap()
        .keys()
        .cloned()
        .collect();
    fields.sort();
    assert_eq!(
        fields,
        vec!["componentName", "model", "quantity", "subtotal", "unitRate"]
    );
    assert!(value["summary"].get("hiddenCost").is_some());
}

#[tokio::test]
async fn oversized_totals_fail_instead_of_panicking() {
    let huge = json!({ "storage_gb": "30000000000000000000000000000" });
    let service = service_with_rates(vec![rate(ResourceType::S3, None, PricingModel::Flat, "1")]);

    let request = DiagramBuilder::new()
        .resource("a", "s3", None, huge.clone())
        .resource("b", "s3", None, huge.clone())
        .resource("c", "s3", None, huge)
        .request("us-east-1");
    let err = service.estimate(request).await.unwrap_err();

    assert!(matches!(err, EstimationError::InvalidInput(_)));
}

#[tokio::test]
async fn containment_typed_resource_nodes_are_not_priced() {
    let request = DiagramBuilder::new()
        .resource("vpc", "vpc", None, json!({}))
        .resource("sg", "security_group", Some("vpc"), json!({}))
        .resource("web", "ec2", Some("vpc"), json!({}))
        .request("us-east-1");

    let estimate = builtin_service().estimate(request).await.unwrap();

    let ids: Vec<_> = estimate
        .resource_estimates
        .iter()
        .map(|r| r.resource_id.as_str())
        .collect();
    assert_eq!(ids, vec!["web"]);
    assert_eq!(estimate.summary.unknown_count, 0);
    assert!(estimate.diagnostics.is_empty());
}

#[tokio::test]
async fn unpinned_estimates_omit_as_of_and_stay_identical() {
    let diagram = DiagramBuilder::new().resource("nat", "nat_gateway", None, json!({}));
    let unpinned = || {
        let mut request = diagram.clone().request("us-east-1");
        request.as_of = None;
        request
    };
    let service = builtin_service();

    let first = service.estimate(unpinned()).await.unwrap();
    let second = service.estimate(unpinned()).await.unwrap();
    assert!(first.as_of.is_none());
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );

    let pinned = service.estimate(diagram.request("us-east-1")).await.unwrap();
    assert_eq!(pinned.as_of, Some(test_utils::fixed_as_of()));
    assert!(serde_json::to_value(&pinned).unwrap().get("asOf").is_some());
}
