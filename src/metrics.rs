//! Metrics access: instant queries against a Prometheus-compatible endpoint
//! and lookups of prometheus-operator objects.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::DynamicObject;
use serde::Deserialize;
use tracing::{debug, info};

use crate::cluster::ClusterClient;
use crate::error::{Error, Result};
use crate::resources::ResourceKind;

/// Namespace and route name of the cluster's query frontend.
pub const THANOS_QUERIER_NAMESPACE: &str = "openshift-monitoring";
pub const THANOS_QUERIER_ROUTE: &str = "thanos-querier";

/// One row of an instant-vector result.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub metric: BTreeMap<String, String>,
    pub value: f64,
}

/// Monitoring configuration kinds the health check looks up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MonitoringKind {
    ServiceMonitor,
    PrometheusRule,
}

impl MonitoringKind {
    pub fn resource_kind(self) -> ResourceKind {
        match self {
            Self::ServiceMonitor => ResourceKind::ServiceMonitor,
            Self::PrometheusRule => ResourceKind::PrometheusRule,
        }
    }
}

#[async_trait]
pub trait MetricsClient: Send + Sync {
    async fn instant_query(&self, expr: &str) -> Result<Vec<Sample>>;

    async fn get_monitoring_rule(
        &self,
        kind: MonitoringKind,
        name: &str,
        namespace: &str,
    ) -> Result<DynamicObject>;
}

// ── Prometheus HTTP API ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    result_type: String,
    #[serde(default)]
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    value: (f64, String),
}

/// Decode an `/api/v1/query` body into samples.
///
/// Only instant vectors are accepted; anything else is a query error so a
/// mistyped expression does not pass as "no data".
pub fn parse_query_response(body: &str) -> Result<Vec<Sample>> {
    let resp: QueryResponse = serde_json::from_str(body)?;
    if resp.status != "success" {
        return Err(Error::Query(format!(
            "{}: {}",
            resp.error_type.as_deref().unwrap_or("error"),
            resp.error.as_deref().unwrap_or("no error message")
        )));
    }
    let data = resp
        .data
        .ok_or_else(|| Error::Query("response has no data".into()))?;
    if data.result_type != "vector" {
        return Err(Error::Query(format!(
            "expected a vector result, got {}",
            data.result_type
        )));
    }
    let rows: Vec<VectorSample> = serde_json::from_value(data.result)?;
    rows.into_iter()
        .map(|row| {
            let value = row.value.1.parse::<f64>().map_err(|_| {
                Error::Query(format!("sample value {:?} is not a number", row.value.1))
            })?;
            Ok(Sample {
                metric: row.metric,
                value,
            })
        })
        .collect()
}

/// Service account whose token reads the cluster's monitoring stack.
pub const PROMETHEUS_SERVICE_ACCOUNT: &str = "prometheus-k8s";

/// Production implementation: reqwest for queries, the cluster client for
/// rule objects, endpoint discovery and credentials.
pub struct PrometheusClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    cluster: Arc<dyn ClusterClient>,
}

impl PrometheusClient {
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        base_url: impl Into<String>,
        token: Option<String>,
        insecure: bool,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .danger_accept_invalid_certs(insecure)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            cluster,
        })
    }

    /// Build a client from optional settings. A missing URL is discovered
    /// from the `thanos-querier` route; a missing token is requested for the
    /// `prometheus-k8s` service account.
    pub async fn connect(
        cluster: Arc<dyn ClusterClient>,
        url: Option<String>,
        token: Option<String>,
        insecure: bool,
    ) -> Result<Self> {
        let url = match url {
            Some(url) => url,
            None => discover_url(cluster.as_ref()).await?,
        };
        let token = match token {
            Some(token) => Some(token),
            None => Some(monitoring_token(cluster.as_ref()).await?),
        };
        Self::new(cluster, url, token, insecure)
    }

    /// Resolve the query endpoint from the `thanos-querier` route, keeping
    /// the given credentials.
    pub async fn discover(
        cluster: Arc<dyn ClusterClient>,
        token: Option<String>,
        insecure: bool,
    ) -> Result<Self> {
        let url = discover_url(cluster.as_ref()).await?;
        Self::new(cluster, url, token, insecure)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

async fn discover_url(cluster: &dyn ClusterClient) -> Result<String> {
    let route = cluster
        .get(
            ResourceKind::Route,
            THANOS_QUERIER_ROUTE,
            Some(THANOS_QUERIER_NAMESPACE),
        )
        .await?;
    let host = route.data["spec"]["host"]
        .as_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| {
            Error::setup(format!(
                "route {THANOS_QUERIER_NAMESPACE}/{THANOS_QUERIER_ROUTE} has no spec.host"
            ))
        })?;
    let url = format!("https://{host}");
    info!(%url, "discovered metrics endpoint");
    Ok(url)
}

async fn monitoring_token(cluster: &dyn ClusterClient) -> Result<String> {
    cluster
        .service_account_token(PROMETHEUS_SERVICE_ACCOUNT, THANOS_QUERIER_NAMESPACE)
        .await
        .map_err(|e| {
            Error::setup(format!(
                "no metrics token given and none could be issued for \
                 {THANOS_QUERIER_NAMESPACE}/{PROMETHEUS_SERVICE_ACCOUNT}: {e}"
            ))
        })
}

#[async_trait]
impl MetricsClient for PrometheusClient {
    async fn instant_query(&self, expr: &str) -> Result<Vec<Sample>> {
        let mut req = self
            .http
            .get(format!("{}/api/v1/query", self.base_url))
            .query(&[("query", expr)]);
        if let Some(ref tok) = self.token {
            req = req.bearer_auth(tok);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        // Prometheus reports bad expressions as 400/422 with a JSON error body.
        if status.is_server_error() {
            return Err(Error::Transport(format!(
                "metrics endpoint returned {status}"
            )));
        }
        if !status.is_success() && serde_json::from_str::<QueryResponse>(&body).is_err() {
            return Err(Error::Query(format!("metrics endpoint returned {status}")));
        }

        let samples = parse_query_response(&body)?;
        debug!(%expr, rows = samples.len(), "instant query");
        Ok(samples)
    }

    async fn get_monitoring_rule(
        &self,
        kind: MonitoringKind,
        name: &str,
        namespace: &str,
    ) -> Result<DynamicObject> {
        self.cluster
            .get(kind.resource_kind(), name, Some(namespace))
            .await
    }
}
