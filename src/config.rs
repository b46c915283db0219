//! Run configuration: command-line/environment settings and the identity of
//! the operator under test.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ── Target identity ──────────────────────────────────────────────────────────

/// Everything the suite needs to know about the monitored operator.
///
/// The cluster ID always comes from the environment; the remaining fields
/// default to the Route Monitor Operator's install and may be overridden from
/// a YAML file.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TargetIdentity {
    #[serde(skip)]
    pub cluster_id: String,
    pub operator_name: String,
    pub namespace: String,
    pub deployment_name: String,
    pub service_name: String,
    pub role_prefix: String,
    pub cluster_role_prefix: String,
    pub expected_replicas: i32,
    pub health_query: String,
    pub expected_health: i64,
    pub monitoring_namespace: String,
    pub monitoring_name: String,
    pub sample_namespace: String,
    pub sample_name: String,
    pub sample_image: String,
}

impl Default for TargetIdentity {
    fn default() -> Self {
        Self {
            cluster_id: String::new(),
            operator_name: "route-monitor-operator".into(),
            namespace: "openshift-route-monitor-operator".into(),
            deployment_name: "route-monitor-operator-controller-manager".into(),
            service_name: "route-monitor-operator-controller-manager-metrics-service".into(),
            role_prefix: "route-monitor-operator".into(),
            cluster_role_prefix: "route-monitor-operator".into(),
            expected_replicas: 1,
            health_query: r#"up{job="route-monitor-operator"}"#.into(),
            expected_health: 1,
            monitoring_namespace: "openshift-route-monitor-operator".into(),
            monitoring_name: "console".into(),
            sample_namespace: "route-monitor-operator".into(),
            sample_name: "routemonitor-e2e-test".into(),
            sample_image: "quay.io/openshift/origin-hello-openshift:latest".into(),
        }
    }
}

impl TargetIdentity {
    /// Defaults overlaid with the fields present in a YAML file.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::setup(format!("reading target file {}: {e}", path.display()))
        })?;
        Self::from_yaml(&contents)
    }
}

// ── Timing ───────────────────────────────────────────────────────────────────

/// Polling cadence and deadlines shared by every case.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timing {
    pub poll_interval: Duration,
    /// Deployment rollout: ready replicas and `Available=True`.
    pub deployment_timeout: Duration,
    /// Object propagation after create/delete in the sample scenario.
    pub convergence_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            deployment_timeout: Duration::from_secs(5 * 60),
            convergence_timeout: Duration::from_secs(10 * 60),
        }
    }
}

// ── Command line ─────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Test cases the runner knows about, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaseName {
    IsInstalled,
    DeploymentRunning,
    CanBeUpgraded,
    MonitoringHealthy,
    SampleWorkload,
}

impl CaseName {
    pub const ALL: [CaseName; 5] = [
        CaseName::IsInstalled,
        CaseName::DeploymentRunning,
        CaseName::CanBeUpgraded,
        CaseName::MonitoringHealthy,
        CaseName::SampleWorkload,
    ];

    pub fn describe(self) -> &'static str {
        match self {
            Self::IsInstalled => "is installed",
            Self::DeploymentRunning => "check deployment is running",
            Self::CanBeUpgraded => "can be upgraded",
            Self::MonitoringHealthy => "exporter and monitoring objects are healthy",
            Self::SampleWorkload => "creates and deletes a monitored sample workload",
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "rmo-e2e",
    about = "End-to-end verification of the Route Monitor Operator"
)]
pub struct Args {
    /// Identifier of the cluster under test.
    #[arg(long, env = "OCM_CLUSTER_ID")]
    pub cluster_id: Option<String>,

    /// OCM authentication token.
    #[arg(long, env = "OCM_TOKEN", hide_env_values = true)]
    pub ocm_token: Option<String>,

    /// Metrics query endpoint. Discovered from the thanos-querier route when unset.
    #[arg(long, env = "PROMETHEUS_URL")]
    pub prometheus_url: Option<String>,

    /// Bearer token for the metrics endpoint.
    #[arg(long, env = "PROMETHEUS_TOKEN", hide_env_values = true)]
    pub prometheus_token: Option<String>,

    /// Skip TLS verification against the metrics endpoint.
    #[arg(long, env = "PROMETHEUS_INSECURE")]
    pub prometheus_insecure: bool,

    /// YAML file overriding the target identity defaults.
    #[arg(long, env = "RMO_E2E_TARGET_FILE")]
    pub target_file: Option<PathBuf>,

    /// Run only these cases (repeatable). Runs all when omitted.
    #[arg(long = "case", value_enum)]
    pub cases: Vec<CaseName>,

    #[arg(long, default_value_t = 1, env = "RMO_E2E_POLL_INTERVAL_SECS")]
    pub poll_interval_secs: u64,

    #[arg(long, default_value_t = 300, env = "RMO_E2E_DEPLOYMENT_TIMEOUT_SECS")]
    pub deployment_timeout_secs: u64,

    #[arg(long, default_value_t = 600, env = "RMO_E2E_CONVERGENCE_TIMEOUT_SECS")]
    pub convergence_timeout_secs: u64,

    /// Write a JSON report of the run to this path.
    #[arg(long, env = "RMO_E2E_REPORT")]
    pub report: Option<PathBuf>,

    /// Log format: "text" for human-readable, "json" for structured.
    #[arg(long, value_enum, default_value = "text", env = "LOG_FORMAT")]
    pub log_format: LogFormat,
}

/// Validated settings: required inputs are present and non-empty.
#[derive(Clone, Debug)]
pub struct Settings {
    pub target: TargetIdentity,
    pub ocm_token: String,
    pub prometheus_url: Option<String>,
    pub prometheus_token: Option<String>,
    pub prometheus_insecure: bool,
    pub cases: Vec<CaseName>,
    pub timing: Timing,
    pub report: Option<PathBuf>,
}

fn required(value: Option<String>, what: &str, var: &str) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::setup(format!("failed to find {what} ({var} environment variable)")))
}

impl Args {
    /// Check required inputs and resolve the target identity.
    pub fn into_settings(self) -> Result<Settings> {
        let cluster_id = required(self.cluster_id, "cluster ID", "OCM_CLUSTER_ID")?;
        let ocm_token = required(self.ocm_token, "OCM token", "OCM_TOKEN")?;

        let mut target = match self.target_file {
            Some(ref path) => TargetIdentity::load(path)?,
            None => TargetIdentity::default(),
        };
        target.cluster_id = cluster_id;

        if self.poll_interval_secs == 0 {
            return Err(Error::setup("poll interval must be at least one second"));
        }

        let mut cases = if self.cases.is_empty() {
            CaseName::ALL.to_vec()
        } else {
            self.cases
        };
        cases.sort();
        cases.dedup();

        Ok(Settings {
            target,
            ocm_token,
            prometheus_url: self.prometheus_url.filter(|u| !u.is_empty()),
            prometheus_token: self.prometheus_token.filter(|t| !t.is_empty()),
            prometheus_insecure: self.prometheus_insecure,
            cases,
            timing: Timing {
                poll_interval: Duration::from_secs(self.poll_interval_secs),
                deployment_timeout: Duration::from_secs(self.deployment_timeout_secs),
                convergence_timeout: Duration::from_secs(self.convergence_timeout_secs),
            },
            report: self.report,
        })
    }
}
