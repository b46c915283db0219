//! rmo-e2e runs the Route Monitor Operator verification suite against the
//! cluster in the current kubeconfig context.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use rmo_e2e::cluster::{ClusterClient, KubeCluster};
use rmo_e2e::config::{Args, LogFormat};
use rmo_e2e::metrics::PrometheusClient;
use rmo_e2e::suite::{self, SuiteContext};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,kube=warn,hyper=warn,tower=warn,reqwest=warn".into());

    match args.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(env_filter).init(),
    }

    // Missing inputs abort here, before any case runs.
    let settings = args.into_settings()?;

    let cluster: Arc<dyn ClusterClient> = Arc::new(KubeCluster::try_default().await?);
    let metrics = PrometheusClient::connect(
        cluster.clone(),
        settings.prometheus_url.clone(),
        settings.prometheus_token.clone(),
        settings.prometheus_insecure,
    )
    .await?;

    info!(
        cluster = %settings.target.cluster_id,
        operator = %settings.target.operator_name,
        ns = %settings.target.namespace,
        metrics = %metrics.base_url(),
        cases = settings.cases.len(),
        "starting rmo-e2e"
    );

    let ctx = SuiteContext::new(
        cluster,
        Arc::new(metrics),
        settings.target.clone(),
        settings.timing,
    );
    let report = suite::run(&ctx, &settings.cases).await;

    if let Some(ref path) = settings.report {
        report.write_json(path)?;
        info!(path = %path.display(), "wrote report");
    }

    for failed in report.failures() {
        error!(
            case = %failed.name,
            error = failed.error.as_deref().unwrap_or_default(),
            "FAILED"
        );
    }
    let passed = report.cases.iter().filter(|c| c.passed).count();
    info!(passed, total = report.cases.len(), duration = ?report.duration, "suite finished");

    Ok(if report.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
