//! Monitoring object lookups and endpoint discovery via the metrics client.

use std::sync::Arc;

use serde_json::json;

use rmo_e2e::checks::{check_health, check_monitoring_objects, HealthSample};
use rmo_e2e::error::Error;
use rmo_e2e::metrics::{PrometheusClient, THANOS_QUERIER_NAMESPACE, THANOS_QUERIER_ROUTE};
use rmo_e2e::resources::ResourceKind;

use crate::common::{ensure_namespace, TestContext};

fn client(ctx: &TestContext) -> PrometheusClient {
    // Nothing listens here; only rule lookups go through the API server.
    PrometheusClient::new(
        Arc::new(ctx.cluster.clone()),
        "http://127.0.0.1:9",
        None,
        false,
    )
    .unwrap()
}

#[tokio::test]
async fn monitoring_objects_are_found() {
    let ctx = TestContext::new().await;
    ctx.create(
        ResourceKind::ServiceMonitor,
        json!({
            "apiVersion": "monitoring.coreos.com/v1",
            "kind": "ServiceMonitor",
            "metadata": { "name": "console" },
            "spec": { "endpoints": [{ "port": "https" }], "selector": {} },
        }),
    )
    .await;
    ctx.create(
        ResourceKind::PrometheusRule,
        json!({
            "apiVersion": "monitoring.coreos.com/v1",
            "kind": "PrometheusRule",
            "metadata": { "name": "console" },
            "spec": { "groups": [] },
        }),
    )
    .await;

    check_monitoring_objects(&client(&ctx), "console", &ctx.ns)
        .await
        .unwrap();
}

#[tokio::test]
async fn missing_service_monitor_is_reported() {
    let ctx = TestContext::new().await;
    let err = check_monitoring_objects(&client(&ctx), "console", &ctx.ns)
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("servicemonitor {}/console not found", ctx.ns)
    );
}

#[tokio::test]
async fn unreachable_endpoint_fails_health_check() {
    let ctx = TestContext::new().await;
    let err = check_health(&client(&ctx), &HealthSample::new("up", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Query(_)), "{err:?}");
    assert!(err.to_string().contains("failed to query up"), "{err}");
}

#[tokio::test]
async fn endpoint_is_discovered_from_route() {
    let ctx = TestContext::new().await;
    ensure_namespace(&ctx.client, THANOS_QUERIER_NAMESPACE).await;
    let routes: kube::Api<kube::api::DynamicObject> = kube::Api::namespaced_with(
        ctx.client.clone(),
        THANOS_QUERIER_NAMESPACE,
        &ResourceKind::Route.api_resource(),
    );
    let route = serde_json::from_value(json!({
        "apiVersion": "route.openshift.io/v1",
        "kind": "Route",
        "metadata": { "name": THANOS_QUERIER_ROUTE, "namespace": THANOS_QUERIER_NAMESPACE },
        "spec": {
            "host": "thanos-querier-openshift-monitoring.apps.example.com",
            "to": { "kind": "Service", "name": "thanos-querier" },
        },
    }))
    .unwrap();
    // Another test may have created it already.
    let _ = routes.create(&Default::default(), &route).await;

    let client = PrometheusClient::discover(Arc::new(ctx.cluster.clone()), None, true)
        .await
        .unwrap();
    assert_eq!(
        client.base_url(),
        "https://thanos-querier-openshift-monitoring.apps.example.com"
    );
}
