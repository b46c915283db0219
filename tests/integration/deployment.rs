//! Deployment readiness against a real API server, with status faked.

use std::time::Duration;

use serde_json::json;

use rmo_e2e::checks::{await_deployment_available, check_ready_replicas};
use rmo_e2e::error::Error;
use rmo_e2e::resources::ResourceKind;

use crate::common::{TestContext, POLL, TIMEOUT};

const NAME: &str = "route-monitor-operator-controller-manager";

async fn create_deployment(ctx: &TestContext) {
    ctx.create(
        ResourceKind::Deployment,
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": { "name": NAME },
            "spec": {
                "replicas": 1,
                "selector": { "matchLabels": { "control-plane": "controller-manager" } },
                "template": {
                    "metadata": { "labels": { "control-plane": "controller-manager" } },
                    "spec": {
                        "containers": [{ "name": "manager", "image": "quay.io/app-sre/rmo:latest" }],
                    },
                },
            },
        }),
    )
    .await;
}

#[tokio::test]
async fn available_deployment_passes() {
    let ctx = TestContext::new().await;
    create_deployment(&ctx).await;
    ctx.patch_status(
        ResourceKind::Deployment,
        NAME,
        json!({
            "replicas": 1,
            "readyReplicas": 1,
            "conditions": [{ "type": "Available", "status": "True", "reason": "MinimumReplicasAvailable" }],
        }),
    )
    .await;

    await_deployment_available(&ctx.cluster, NAME, &ctx.ns, 1, POLL, TIMEOUT)
        .await
        .unwrap();
    check_ready_replicas(&ctx.cluster, NAME, &ctx.ns, 1)
        .await
        .unwrap();
}

#[tokio::test]
async fn deployment_without_ready_replicas_times_out() {
    let ctx = TestContext::new().await;
    create_deployment(&ctx).await;

    let err = await_deployment_available(
        &ctx.cluster,
        NAME,
        &ctx.ns,
        1,
        POLL,
        Duration::from_secs(2),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }), "{err:?}");

    let err = check_ready_replicas(&ctx.cluster, NAME, &ctx.ns, 1)
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("ready replicas of deployment {}/{NAME}: expected 1, got 0", ctx.ns)
    );
}

#[tokio::test]
async fn missing_deployment_is_not_found() {
    let ctx = TestContext::new().await;
    let err = check_ready_replicas(&ctx.cluster, NAME, &ctx.ns, 1)
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "{err:?}");
}
