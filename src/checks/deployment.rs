use std::time::Duration;

use k8s_openapi::api::apps::v1::Deployment;
use tracing::info;

use crate::cluster::ClusterClient;
use crate::error::{Error, Result};
use crate::poll::eventually;
use crate::resources::{object_path, parse_as, ResourceKind};

/// Ready replicas reported by the deployment status (0 when unset).
fn ready_replicas(dep: &Deployment) -> i32 {
    dep.status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0)
}

/// `expected` replicas are ready and the `Available` condition is `True`.
pub fn deployment_available(dep: &Deployment, expected: i32) -> bool {
    let available = dep
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conds| {
            conds
                .iter()
                .any(|c| c.type_ == "Available" && c.status == "True")
        })
        .unwrap_or(false);
    available && ready_replicas(dep) == expected
}

async fn get_deployment(
    cluster: &dyn ClusterClient,
    name: &str,
    namespace: &str,
) -> Result<Deployment> {
    let obj = cluster
        .get(ResourceKind::Deployment, name, Some(namespace))
        .await?;
    parse_as(&obj)
}

/// Poll until the deployment is available with `expected` ready replicas.
///
/// A missing deployment is retried like a transport error: it may simply not
/// have been created yet.
pub async fn await_deployment_available(
    cluster: &dyn ClusterClient,
    name: &str,
    namespace: &str,
    expected: i32,
    interval: Duration,
    deadline: Duration,
) -> Result<()> {
    let what = format!(
        "deployment {} to be available with {expected} ready replicas",
        object_path(name, Some(namespace))
    );
    eventually(&what, interval, deadline, move || async move {
        match get_deployment(cluster, name, namespace).await {
            Ok(dep) => Ok(deployment_available(&dep, expected)),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    })
    .await?;
    info!(%name, %namespace, "deployment available");
    Ok(())
}

/// One-shot: the deployment reports exactly `expected` ready replicas.
pub async fn check_ready_replicas(
    cluster: &dyn ClusterClient,
    name: &str,
    namespace: &str,
    expected: i32,
) -> Result<()> {
    let dep = get_deployment(cluster, name, namespace).await?;
    let actual = ready_replicas(&dep);
    if actual != expected {
        return Err(Error::assertion(
            format!(
                "ready replicas of deployment {}",
                object_path(name, Some(namespace))
            ),
            expected,
            actual,
        ));
    }
    Ok(())
}
