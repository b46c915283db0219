//! Cluster access: the [`ClusterClient`] seam and its kube-rs implementation.

use async_trait::async_trait;
use k8s_openapi::api::authentication::v1::{TokenRequest, TokenRequestSpec};
use k8s_openapi::api::core::v1::ServiceAccount;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::olm;
use crate::resources::{object_path, ResourceKind, FIELD_MANAGER};

/// Lifetime requested for service account tokens.
const TOKEN_TTL_SECS: i64 = 3600;

/// Trait abstracting the cluster API so checks can run against a fake.
///
/// `namespace` is ignored for cluster-scoped kinds. For `list`, `None` on a
/// namespaced kind lists across every namespace.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn get(
        &self,
        kind: ResourceKind,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<DynamicObject>;

    async fn list(&self, kind: ResourceKind, namespace: Option<&str>)
        -> Result<Vec<DynamicObject>>;

    async fn create(&self, kind: ResourceKind, obj: &DynamicObject) -> Result<()>;

    async fn delete(&self, kind: ResourceKind, name: &str, namespace: Option<&str>)
        -> Result<()>;

    /// JSON merge patch of the object's main resource.
    async fn patch(
        &self,
        kind: ResourceKind,
        name: &str,
        namespace: Option<&str>,
        patch: &serde_json::Value,
    ) -> Result<DynamicObject>;

    async fn trigger_upgrade(&self, operator: &str, namespace: &str) -> Result<()>;

    /// Short-lived bearer token for a service account (TokenRequest API).
    async fn service_account_token(&self, name: &str, namespace: &str) -> Result<String>;
}

/// Production implementation backed by a kube [`Client`].
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build from the ambient kubeconfig or in-cluster service account.
    pub async fn try_default() -> Result<Self> {
        Ok(Self::new(Client::try_default().await?))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn api(&self, kind: ResourceKind, namespace: Option<&str>) -> Api<DynamicObject> {
        let ar = kind.api_resource();
        match namespace {
            Some(ns) if !kind.is_cluster_scoped() => {
                Api::namespaced_with(self.client.clone(), ns, &ar)
            }
            _ => Api::all_with(self.client.clone(), &ar),
        }
    }
}

/// Turn a 404 from the API server into [`Error::NotFound`] naming the object.
fn map_not_found(err: kube::Error, kind: ResourceKind, name: &str, ns: Option<&str>) -> Error {
    match err {
        kube::Error::Api(e) if e.code == 404 => Error::not_found(kind, object_path(name, ns)),
        e => Error::Kube(e),
    }
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn get(
        &self,
        kind: ResourceKind,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<DynamicObject> {
        self.api(kind, namespace)
            .get(name)
            .await
            .map_err(|e| map_not_found(e, kind, name, namespace))
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<DynamicObject>> {
        let list = self
            .api(kind, namespace)
            .list(&ListParams::default())
            .await?;
        debug!(%kind, count = list.items.len(), "listed objects");
        Ok(list.items)
    }

    async fn create(&self, kind: ResourceKind, obj: &DynamicObject) -> Result<()> {
        let ns = obj.namespace();
        let created = self
            .api(kind, ns.as_deref())
            .create(&PostParams::default(), obj)
            .await?;
        info!(%kind, name = %created.name_any(), ns = ?ns, "created object");
        Ok(())
    }

    async fn delete(
        &self,
        kind: ResourceKind,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<()> {
        self.api(kind, namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| map_not_found(e, kind, name, namespace))?;
        info!(%kind, %name, ns = ?namespace, "deleted object");
        Ok(())
    }

    async fn patch(
        &self,
        kind: ResourceKind,
        name: &str,
        namespace: Option<&str>,
        patch: &serde_json::Value,
    ) -> Result<DynamicObject> {
        let patched = self
            .api(kind, namespace)
            .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await
            .map_err(|e| map_not_found(e, kind, name, namespace))?;
        debug!(%kind, %name, ns = ?namespace, "patched object");
        Ok(patched)
    }

    async fn trigger_upgrade(&self, operator: &str, namespace: &str) -> Result<()> {
        olm::force_upgrade(self, operator, namespace).await
    }

    async fn service_account_token(&self, name: &str, namespace: &str) -> Result<String> {
        let sas: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        let request = TokenRequest {
            spec: TokenRequestSpec {
                expiration_seconds: Some(TOKEN_TTL_SECS),
                ..Default::default()
            },
            ..Default::default()
        };
        let issued = sas
            .create_token_request(name, &PostParams::default(), &request)
            .await
            .map_err(|e| map_not_found(e, ResourceKind::ServiceAccount, name, Some(namespace)))?;
        let token = issued
            .status
            .map(|s| s.token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                Error::Transport(format!(
                    "token request for serviceaccount {} returned no token",
                    object_path(name, Some(namespace))
                ))
            })?;
        info!(sa = %name, ns = %namespace, "issued service account token");
        Ok(token)
    }
}
