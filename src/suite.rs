//! Test cases and the sequential runner.
//!
//! A [`SuiteContext`] is built once per run and handed to every case. Cases
//! fail fast on their first unmet assertion; a failing case never stops the
//! ones after it.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{error, info};

use crate::checks::{
    await_deployment_available, check_exists, check_health, check_monitoring_objects,
    check_ready_replicas, trigger_upgrade, ExistenceCheck, HealthSample, Scope,
};
use crate::cluster::ClusterClient;
use crate::config::{CaseName, TargetIdentity, Timing};
use crate::error::{Error, Result};
use crate::metrics::MetricsClient;
use crate::resources::ResourceKind;
use crate::workload::{SampleWorkload, WorkloadState};

pub const SUITE_NAME: &str = "[Suite: informing] [OSD] Route Monitor Operator (rmo)";

/// Shared per-run state passed to every case.
#[derive(Clone)]
pub struct SuiteContext {
    pub cluster: Arc<dyn ClusterClient>,
    pub metrics: Arc<dyn MetricsClient>,
    pub target: TargetIdentity,
    pub timing: Timing,
}

impl SuiteContext {
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        metrics: Arc<dyn MetricsClient>,
        target: TargetIdentity,
        timing: Timing,
    ) -> Self {
        Self {
            cluster,
            metrics,
            target,
            timing,
        }
    }
}

// ── Cases ────────────────────────────────────────────────────────────────────

/// The objects an installed operator must have, in the order they are checked.
pub fn install_checks(target: &TargetIdentity) -> Vec<ExistenceCheck> {
    let ns = Scope::Namespaced(target.namespace.clone());
    vec![
        ExistenceCheck::exact(ResourceKind::Namespace, Scope::Cluster, &target.namespace),
        ExistenceCheck::prefix(ResourceKind::Role, ns.clone(), &target.role_prefix),
        ExistenceCheck::prefix(
            ResourceKind::RoleBinding,
            Scope::AllNamespaces,
            &target.role_prefix,
        ),
        ExistenceCheck::prefix(
            ResourceKind::ClusterRole,
            Scope::Cluster,
            &target.cluster_role_prefix,
        ),
        ExistenceCheck::prefix(
            ResourceKind::ClusterRoleBinding,
            Scope::Cluster,
            &target.cluster_role_prefix,
        ),
        ExistenceCheck::exact(ResourceKind::Service, ns, &target.service_name),
    ]
}

pub async fn is_installed(ctx: &SuiteContext) -> Result<()> {
    let t = &ctx.target;
    for check in install_checks(t) {
        info!(kind = %check.kind, selector = %check.selector, "checking the object exists");
        check_exists(ctx.cluster.as_ref(), &check).await?;
    }
    info!("checking the deployment exists and is available");
    await_deployment_available(
        ctx.cluster.as_ref(),
        &t.deployment_name,
        &t.namespace,
        t.expected_replicas,
        ctx.timing.poll_interval,
        ctx.timing.deployment_timeout,
    )
    .await
}

pub async fn deployment_running(ctx: &SuiteContext) -> Result<()> {
    let t = &ctx.target;
    check_ready_replicas(
        ctx.cluster.as_ref(),
        &t.deployment_name,
        &t.namespace,
        t.expected_replicas,
    )
    .await
}

pub async fn can_be_upgraded(ctx: &SuiteContext) -> Result<()> {
    let t = &ctx.target;
    trigger_upgrade(ctx.cluster.as_ref(), &t.operator_name, &t.namespace).await?;
    info!("waiting for the upgraded deployment to become available");
    await_deployment_available(
        ctx.cluster.as_ref(),
        &t.deployment_name,
        &t.namespace,
        t.expected_replicas,
        ctx.timing.poll_interval,
        ctx.timing.deployment_timeout,
    )
    .await
}

pub async fn monitoring_healthy(ctx: &SuiteContext) -> Result<()> {
    let t = &ctx.target;
    check_health(
        ctx.metrics.as_ref(),
        &HealthSample::new(&t.health_query, t.expected_health),
    )
    .await?;
    check_monitoring_objects(
        ctx.metrics.as_ref(),
        &t.monitoring_name,
        &t.monitoring_namespace,
    )
    .await
}

pub async fn sample_workload(ctx: &SuiteContext) -> Result<()> {
    let t = &ctx.target;
    let mut workload = SampleWorkload::new(
        ctx.cluster.as_ref(),
        &t.sample_name,
        &t.sample_namespace,
        &t.sample_image,
        ctx.timing,
    );
    info!("creating a pod, service, and route to monitor");
    let result = async {
        workload.create().await?;
        workload.await_present().await?;
        info!("deleting the sample service");
        workload.delete_service().await?;
        workload.await_absent().await
    }
    .await;

    if result.is_err() && workload.state() != WorkloadState::Absent {
        workload.cleanup().await;
    }
    result
}

pub async fn run_case(ctx: &SuiteContext, case: CaseName) -> Result<()> {
    match case {
        CaseName::IsInstalled => is_installed(ctx).await,
        CaseName::DeploymentRunning => deployment_running(ctx).await,
        CaseName::CanBeUpgraded => can_be_upgraded(ctx).await,
        CaseName::MonitoringHealthy => monitoring_healthy(ctx).await,
        CaseName::SampleWorkload => sample_workload(ctx).await,
    }
}

// ── Report ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize)]
pub struct CaseOutcome {
    pub case: CaseName,
    pub name: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(with = "secs")]
    pub duration: Duration,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteReport {
    pub suite: String,
    pub cluster_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(with = "secs")]
    pub duration: Duration,
    pub cases: Vec<CaseOutcome>,
}

impl SuiteReport {
    pub fn passed(&self) -> bool {
        self.cases.iter().all(|c| c.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseOutcome> {
        self.cases.iter().filter(|c| !c.passed)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let body = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, body)
            .map_err(|e| Error::setup(format!("writing report {}: {e}", path.display())))
    }
}

mod secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

// ── Runner ───────────────────────────────────────────────────────────────────

/// Run `cases` in order and collect one outcome per case.
pub async fn run(ctx: &SuiteContext, cases: &[CaseName]) -> SuiteReport {
    let started_at = Utc::now();
    let start = Instant::now();
    let mut outcomes = Vec::with_capacity(cases.len());

    for &case in cases {
        let name = case.describe();
        info!(case = %name, "running case");
        let case_start = Instant::now();
        let result = run_case(ctx, case).await;
        let duration = case_start.elapsed();
        match result {
            Ok(()) => info!(case = %name, ?duration, "case passed"),
            Err(ref e) => error!(case = %name, ?duration, error = %e, "case failed"),
        }
        outcomes.push(CaseOutcome {
            case,
            name: name.to_string(),
            passed: result.is_ok(),
            error: result.err().map(|e| e.to_string()),
            duration,
        });
    }

    SuiteReport {
        suite: SUITE_NAME.to_string(),
        cluster_id: ctx.target.cluster_id.clone(),
        started_at,
        duration: start.elapsed(),
        cases: outcomes,
    }
}
