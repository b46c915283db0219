//! Operator upgrades through OLM.
//!
//! Two situations are handled. When the subscription's installed CSV lags
//! the channel head, the pending InstallPlan is approved. When the operator
//! already runs the channel head, it is reinstalled from the CSV it replaces
//! so OLM walks it forward again; an operator with no earlier version cannot
//! be upgraded and that is reported as a failure.

use kube::api::DynamicObject;
use serde_json::{json, Value};
use tracing::info;

use crate::cluster::ClusterClient;
use crate::error::{Error, Result};
use crate::resources::ResourceKind;

const SUBSCRIPTION_API_VERSION: &str = "operators.coreos.com/v1alpha1";

fn upgrade_error(operator: &str, namespace: &str, reason: impl Into<String>) -> Error {
    Error::Upgrade {
        operator: operator.to_string(),
        namespace: namespace.to_string(),
        reason: reason.into(),
    }
}

/// Upgrade `operator`, whose Subscription shares its name, in `namespace`.
pub async fn force_upgrade(
    cluster: &dyn ClusterClient,
    operator: &str,
    namespace: &str,
) -> Result<()> {
    let sub = cluster
        .get(ResourceKind::Subscription, operator, Some(namespace))
        .await?;
    let status = &sub.data["status"];
    let current = status["currentCSV"]
        .as_str()
        .ok_or_else(|| upgrade_error(operator, namespace, "subscription has no status.currentCSV"))?;
    let installed = status["installedCSV"].as_str().unwrap_or_default();

    if installed != current {
        approve_pending_plan(cluster, operator, namespace, status, installed, current).await
    } else {
        reinstall_from_previous(cluster, &sub, operator, namespace, current).await
    }
}

async fn approve_pending_plan(
    cluster: &dyn ClusterClient,
    operator: &str,
    namespace: &str,
    status: &Value,
    installed: &str,
    current: &str,
) -> Result<()> {
    let plan = status["installPlanRef"]["name"].as_str().ok_or_else(|| {
        upgrade_error(operator, namespace, format!("no install plan pending for {current}"))
    })?;
    cluster
        .patch(
            ResourceKind::InstallPlan,
            plan,
            Some(namespace),
            &json!({ "spec": { "approved": true } }),
        )
        .await?;
    info!(%operator, %installed, target = %current, %plan, "approved install plan");
    Ok(())
}

async fn reinstall_from_previous(
    cluster: &dyn ClusterClient,
    sub: &DynamicObject,
    operator: &str,
    namespace: &str,
    current: &str,
) -> Result<()> {
    let csv = cluster
        .get(ResourceKind::ClusterServiceVersion, current, Some(namespace))
        .await?;
    let previous = csv.data["spec"]["replaces"]
        .as_str()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            upgrade_error(
                operator,
                namespace,
                format!("{current} replaces no earlier version, nothing to upgrade from"),
            )
        })?;

    let mut spec = sub.data["spec"].clone();
    spec["startingCSV"] = json!(previous);
    spec["installPlanApproval"] = json!("Automatic");
    let replacement: DynamicObject = serde_json::from_value(json!({
        "apiVersion": SUBSCRIPTION_API_VERSION,
        "kind": "Subscription",
        "metadata": {
            "name": operator,
            "namespace": namespace,
            "labels": sub.metadata.labels,
        },
        "spec": spec,
    }))?;

    cluster
        .delete(ResourceKind::Subscription, operator, Some(namespace))
        .await?;
    cluster
        .delete(ResourceKind::ClusterServiceVersion, current, Some(namespace))
        .await?;
    cluster
        .create(ResourceKind::Subscription, &replacement)
        .await?;
    info!(%operator, from = %previous, to = %current, "reinstalled operator from previous version");
    Ok(())
}
