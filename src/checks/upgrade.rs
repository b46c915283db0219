use tracing::info;

use crate::cluster::ClusterClient;
use crate::error::{Error, Result};

/// Ask the cluster to upgrade `operator`. One attempt, no retry.
///
/// Any failure comes back as [`Error::Upgrade`] with the underlying error
/// text unchanged.
pub async fn trigger_upgrade(
    cluster: &dyn ClusterClient,
    operator: &str,
    namespace: &str,
) -> Result<()> {
    info!(%operator, %namespace, "forcing operator upgrade");
    cluster
        .trigger_upgrade(operator, namespace)
        .await
        .map_err(|e| match e {
            e @ Error::Upgrade { .. } => e,
            e => Error::Upgrade {
                operator: operator.to_string(),
                namespace: namespace.to_string(),
                reason: e.to_string(),
            },
        })
}
