use tracing::info;

use crate::error::{Error, Result};
use crate::metrics::{MetricsClient, MonitoringKind};

/// An expression whose first sample must equal `expected`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HealthSample {
    pub expression: String,
    pub expected: i64,
}

impl HealthSample {
    pub fn new(expression: impl Into<String>, expected: i64) -> Self {
        Self {
            expression: expression.into(),
            expected,
        }
    }
}

/// Run the query once and compare the first row, truncated to an integer.
pub async fn check_health(metrics: &dyn MetricsClient, sample: &HealthSample) -> Result<()> {
    let rows = metrics
        .instant_query(&sample.expression)
        .await
        .map_err(|e| match e {
            e @ Error::Query(_) => e,
            e => Error::Query(format!("failed to query {}: {e}", sample.expression)),
        })?;
    let first = rows.first().ok_or_else(|| {
        Error::Query(format!("query {} returned no results", sample.expression))
    })?;

    let actual = first.value as i64;
    if actual != sample.expected {
        return Err(Error::assertion(
            format!("exporter health ({})", sample.expression),
            sample.expected,
            actual,
        ));
    }
    info!(expr = %sample.expression, value = first.value, "exporter healthy");
    Ok(())
}

/// Both the service monitor and the alerting rule named `name` exist.
pub async fn check_monitoring_objects(
    metrics: &dyn MetricsClient,
    name: &str,
    namespace: &str,
) -> Result<()> {
    for kind in [MonitoringKind::ServiceMonitor, MonitoringKind::PrometheusRule] {
        metrics.get_monitoring_rule(kind, name, namespace).await?;
        info!(kind = %kind.resource_kind(), %name, %namespace, "monitoring object present");
    }
    Ok(())
}
