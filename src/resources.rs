//! Resource kinds the suite touches, and builders for the sample workload.
//!
//! Everything goes through [`DynamicObject`] so a single object-safe client
//! trait can serve built-in kinds (Namespace, Role, ...) and the OpenShift,
//! OLM and prometheus-operator kinds that k8s-openapi does not model.

use std::fmt;

use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{Namespace, Pod, Service, ServiceAccount},
    rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding},
};
use kube::api::{ApiResource, DynamicObject};
use kube::core::GroupVersionKind;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::error::Result;

/// Field manager name used when the suite patches objects.
pub const FIELD_MANAGER: &str = "rmo-e2e";

/// Port the sample pod listens on and the service/route target.
pub const SAMPLE_PORT: i32 = 8080;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    Namespace,
    Role,
    RoleBinding,
    ClusterRole,
    ClusterRoleBinding,
    Service,
    Deployment,
    Pod,
    Route,
    ServiceMonitor,
    PrometheusRule,
    Subscription,
    InstallPlan,
    ClusterServiceVersion,
    ServiceAccount,
}

impl ResourceKind {
    /// The API group/version/plural for this kind.
    pub fn api_resource(self) -> ApiResource {
        match self {
            Self::Namespace => ApiResource::erase::<Namespace>(&()),
            Self::Role => ApiResource::erase::<Role>(&()),
            Self::RoleBinding => ApiResource::erase::<RoleBinding>(&()),
            Self::ClusterRole => ApiResource::erase::<ClusterRole>(&()),
            Self::ClusterRoleBinding => ApiResource::erase::<ClusterRoleBinding>(&()),
            Self::Service => ApiResource::erase::<Service>(&()),
            Self::Deployment => ApiResource::erase::<Deployment>(&()),
            Self::Pod => ApiResource::erase::<Pod>(&()),
            Self::Route => gvk("route.openshift.io", "v1", "Route"),
            Self::ServiceMonitor => gvk("monitoring.coreos.com", "v1", "ServiceMonitor"),
            Self::PrometheusRule => gvk("monitoring.coreos.com", "v1", "PrometheusRule"),
            Self::Subscription => gvk("operators.coreos.com", "v1alpha1", "Subscription"),
            Self::InstallPlan => gvk("operators.coreos.com", "v1alpha1", "InstallPlan"),
            Self::ClusterServiceVersion => {
                gvk("operators.coreos.com", "v1alpha1", "ClusterServiceVersion")
            }
            Self::ServiceAccount => ApiResource::erase::<ServiceAccount>(&()),
        }
    }

    /// Cluster-scoped kinds ignore any namespace passed alongside them.
    pub fn is_cluster_scoped(self) -> bool {
        matches!(
            self,
            Self::Namespace | Self::ClusterRole | Self::ClusterRoleBinding
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Namespace => "namespace",
            Self::Role => "role",
            Self::RoleBinding => "rolebinding",
            Self::ClusterRole => "clusterrole",
            Self::ClusterRoleBinding => "clusterrolebinding",
            Self::Service => "service",
            Self::Deployment => "deployment",
            Self::Pod => "pod",
            Self::Route => "route",
            Self::ServiceMonitor => "servicemonitor",
            Self::PrometheusRule => "prometheusrule",
            Self::Subscription => "subscription",
            Self::InstallPlan => "installplan",
            Self::ClusterServiceVersion => "clusterserviceversion",
            Self::ServiceAccount => "serviceaccount",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn gvk(group: &str, version: &str, kind: &str) -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk(group, version, kind))
}

/// Human-readable `namespace/name` (or bare `name` for cluster-scoped lookups).
pub fn object_path(name: &str, namespace: Option<&str>) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => format!("{ns}/{name}"),
        _ => name.to_string(),
    }
}

/// Re-read a dynamic object as a typed k8s-openapi struct.
pub fn parse_as<K>(obj: &DynamicObject) -> Result<K>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    let mut value = serde_json::to_value(obj)?;
    value["apiVersion"] = K::api_version(&()).into();
    value["kind"] = K::kind(&()).into();
    Ok(serde_json::from_value(value)?)
}

// ── Sample workload builders ─────────────────────────────────────────────────

/// A single-container pod serving HTTP on [`SAMPLE_PORT`].
pub fn sample_pod(name: &str, namespace: &str, image: &str) -> Result<DynamicObject> {
    Ok(serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "labels": { "app": name },
        },
        "spec": {
            "containers": [{
                "name": name,
                "image": image,
                "ports": [{ "containerPort": SAMPLE_PORT, "protocol": "TCP" }],
                "securityContext": {
                    "allowPrivilegeEscalation": false,
                    "runAsNonRoot": true,
                    "capabilities": { "drop": ["ALL"] },
                    "seccompProfile": { "type": "RuntimeDefault" },
                },
            }],
        },
    }))?)
}

/// A ClusterIP service selecting the sample pod.
pub fn sample_service(name: &str, namespace: &str) -> Result<DynamicObject> {
    Ok(serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "labels": { "app": name },
        },
        "spec": {
            "selector": { "app": name },
            "ports": [{
                "name": "http",
                "port": SAMPLE_PORT,
                "targetPort": SAMPLE_PORT,
                "protocol": "TCP",
            }],
        },
    }))?)
}

/// An edge-terminated route exposing the sample service.
pub fn sample_route(name: &str, namespace: &str) -> Result<DynamicObject> {
    Ok(serde_json::from_value(json!({
        "apiVersion": "route.openshift.io/v1",
        "kind": "Route",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "labels": { "app": name },
        },
        "spec": {
            "to": { "kind": "Service", "name": name },
            "port": { "targetPort": "http" },
            "tls": { "termination": "edge" },
        },
    }))?)
}
