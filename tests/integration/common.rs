//! Shared test harness and helpers for envtest-based integration tests.
//!
//! A single envtest server is shared across all tests in this binary. Each
//! test gets its own Kubernetes namespace for isolation, so tests can run in
//! parallel.
//!
//! There is no kubelet, controller-manager or OLM in envtest: Deployment,
//! Pod and Subscription status must be faked by patching status subresources,
//! and the OpenShift/OLM/prometheus-operator kinds are registered as
//! schemaless CRDs.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use envtest::Environment;
use k8s_openapi::api::core::v1::{Namespace, ServiceAccount};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, DynamicObject, Patch, PatchParams, PostParams};
use kube::config::KubeConfigOptions;
use kube::{Client, Config};
use serde_json::json;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use rmo_e2e::cluster::{ClusterClient, KubeCluster};
use rmo_e2e::config::{TargetIdentity, Timing};
use rmo_e2e::resources::{ResourceKind, FIELD_MANAGER};

pub const TIMEOUT: Duration = Duration::from_secs(30);
pub const POLL: Duration = Duration::from_millis(500);

/// Counter for generating unique namespace names.
static NS_COUNTER: AtomicU32 = AtomicU32::new(0);

// ═══════════════════════════════════════════════════════════════════════════════
// Shared environment (one envtest server per test binary)
// ═══════════════════════════════════════════════════════════════════════════════

/// Holds the envtest server, a kube Client, and the tokio runtime that owns
/// the client's connections. All three live for the entire process.
struct SharedEnv {
    client: Client,
    // The runtime keeps kube HTTP connections alive across individual
    // `#[tokio::test]` runtimes.
    _runtime: tokio::runtime::Runtime,
    _server: envtest::Server,
}

// SAFETY: envtest::Server only holds the kubeconfig string.
unsafe impl Send for SharedEnv {}
unsafe impl Sync for SharedEnv {}

/// Initialised on first use and never torn down.
static SHARED: OnceLock<SharedEnv> = OnceLock::new();

/// A namespaced, schemaless CRD with a status subresource.
fn schemaless_crd(group: &str, version: &str, kind: &str, plural: &str) -> CustomResourceDefinition {
    serde_json::from_value(json!({
        "apiVersion": "apiextensions.k8s.io/v1",
        "kind": "CustomResourceDefinition",
        "metadata": { "name": format!("{plural}.{group}") },
        "spec": {
            "group": group,
            "scope": "Namespaced",
            "names": {
                "kind": kind,
                "plural": plural,
                "singular": kind.to_lowercase(),
                "listKind": format!("{kind}List"),
            },
            "versions": [{
                "name": version,
                "served": true,
                "storage": true,
                "subresources": { "status": {} },
                "schema": {
                    "openAPIV3Schema": {
                        "type": "object",
                        "x-kubernetes-preserve-unknown-fields": true,
                    },
                },
            }],
        },
    }))
    .expect("invalid CRD")
}

fn crds() -> Vec<CustomResourceDefinition> {
    vec![
        schemaless_crd("route.openshift.io", "v1", "Route", "routes"),
        schemaless_crd("monitoring.coreos.com", "v1", "ServiceMonitor", "servicemonitors"),
        schemaless_crd("monitoring.coreos.com", "v1", "PrometheusRule", "prometheusrules"),
        schemaless_crd("operators.coreos.com", "v1alpha1", "Subscription", "subscriptions"),
        schemaless_crd("operators.coreos.com", "v1alpha1", "InstallPlan", "installplans"),
        schemaless_crd(
            "operators.coreos.com",
            "v1alpha1",
            "ClusterServiceVersion",
            "clusterserviceversions",
        ),
    ]
}

fn init_shared() -> SharedEnv {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("warn,rmo_e2e=debug"))
        .try_init();

    // Build a multi-threaded runtime that outlives every `#[tokio::test]`.
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build shared runtime");

    let (client, server) = rt.block_on(async {
        let mut env = Environment::default();
        let env = env.with_crds(crds()).expect("failed to configure CRDs");

        let server = env.create().expect("failed to start envtest server");
        let kubeconfig = server.kubeconfig().expect("failed to get kubeconfig");
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .expect("failed to build config");
        let client = Client::try_from(config).expect("failed to create client");
        (client, server)
    });

    SharedEnv {
        client,
        _runtime: rt,
        _server: server,
    }
}

/// Get (or create) the shared envtest environment.
///
/// Initialization runs on a dedicated OS thread to avoid the "cannot start a
/// runtime from within a runtime" panic that would occur if `block_on` were
/// called from inside a `#[tokio::test]` context.
fn shared() -> &'static SharedEnv {
    SHARED.get_or_init(|| {
        std::thread::spawn(init_shared)
            .join()
            .expect("shared env init thread panicked")
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// Per-test context
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-test context: owns a unique namespace and provides clients.
pub struct TestContext {
    pub client: Client,
    pub cluster: KubeCluster,
    pub ns: String,
}

impl TestContext {
    pub async fn new() -> Self {
        let client = shared().client.clone();

        let id = NS_COUNTER.fetch_add(1, Ordering::SeqCst);
        let ns = format!("rmo-test-{id}");
        ensure_namespace(&client, &ns).await;

        // Nothing creates the default service account without a
        // controller-manager, and pod admission requires it.
        let sas: Api<ServiceAccount> = Api::namespaced(client.clone(), &ns);
        let sa: ServiceAccount = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "ServiceAccount",
            "metadata": { "name": "default", "namespace": &ns },
        }))
        .unwrap();
        let _ = sas.create(&PostParams::default(), &sa).await;

        Self {
            cluster: KubeCluster::new(client.clone()),
            client,
            ns,
        }
    }

    /// Target identity pointing at this test's namespace. Cluster-scoped
    /// prefixes include the namespace so parallel tests don't see each
    /// other's objects.
    pub fn target(&self) -> TargetIdentity {
        TargetIdentity {
            cluster_id: "envtest".into(),
            namespace: self.ns.clone(),
            cluster_role_prefix: format!("{}-rmo", self.ns),
            monitoring_namespace: self.ns.clone(),
            sample_namespace: self.ns.clone(),
            ..Default::default()
        }
    }

    /// Create an object in this test's namespace from a JSON manifest.
    pub async fn create(&self, kind: ResourceKind, mut manifest: serde_json::Value) {
        if !kind.is_cluster_scoped() {
            manifest["metadata"]["namespace"] = json!(self.ns);
        }
        let obj: DynamicObject = serde_json::from_value(manifest).unwrap();
        self.cluster
            .create(kind, &obj)
            .await
            .unwrap_or_else(|e| panic!("failed to create {kind}: {e}"));
    }

    /// Merge-patch the status subresource of an object in this namespace.
    pub async fn patch_status(&self, kind: ResourceKind, name: &str, status: serde_json::Value) {
        patch_status(&self.client, kind, &self.ns, name, status)
            .await
            .unwrap_or_else(|e| panic!("failed to patch {kind} {name} status: {e}"));
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════════════

/// Short timings so failure-path tests finish quickly.
pub fn timing() -> Timing {
    Timing {
        poll_interval: POLL,
        deployment_timeout: TIMEOUT,
        convergence_timeout: TIMEOUT,
    }
}

/// Create a namespace, tolerating one that already exists.
pub async fn ensure_namespace(client: &Client, name: &str) {
    let ns_api: Api<Namespace> = Api::all(client.clone());
    let ns_obj: Namespace = serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": { "name": name }
    }))
    .unwrap();
    match ns_api.create(&PostParams::default(), &ns_obj).await {
        Ok(_) => {}
        Err(kube::Error::Api(e)) if e.code == 409 => {}
        Err(e) => panic!("failed to create namespace {name}: {e}"),
    }
}

pub async fn patch_status(
    client: &Client,
    kind: ResourceKind,
    ns: &str,
    name: &str,
    status: serde_json::Value,
) -> Result<DynamicObject, kube::Error> {
    let api: Api<DynamicObject> = Api::namespaced_with(client.clone(), ns, &kind.api_resource());
    api.patch_status(
        name,
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&json!({ "status": status })),
    )
    .await
}

/// Continuously mark a pod as running in the background, standing in for
/// the kubelet. Returns a JoinHandle that should be aborted when no longer
/// needed.
pub fn keep_pod_running(client: Client, ns: String, name: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let _ = patch_status(
                &client,
                ResourceKind::Pod,
                &ns,
                &name,
                json!({ "phase": "Running" }),
            )
            .await;
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    })
}
