//! Sample workload lifecycle: a pod, a service and a route the operator is
//! expected to pick up, created and torn down by the suite.
//!
//! ```text
//! Absent --create--> Creating --await_present--> Present
//!   ^                                               |
//!   +------await_absent------ Deleting <--delete----+
//! ```
//!
//! Creation failures roll back whatever was already created and return the
//! workload to `Absent`. [`SampleWorkload::cleanup`] does the same from any
//! later state.

use std::fmt;

use k8s_openapi::api::core::v1::Pod;
use tracing::{info, warn};

use crate::cluster::ClusterClient;
use crate::config::Timing;
use crate::error::{Error, Result};
use crate::poll::eventually;
use crate::resources::{
    object_path, parse_as, sample_pod, sample_route, sample_service, ResourceKind,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkloadState {
    Absent,
    Creating,
    Present,
    Deleting,
}

impl fmt::Display for WorkloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Absent => "absent",
            Self::Creating => "creating",
            Self::Present => "present",
            Self::Deleting => "deleting",
        };
        f.write_str(s)
    }
}

/// Creation order. Rollback and teardown walk it backwards.
const CREATE_ORDER: [ResourceKind; 3] =
    [ResourceKind::Pod, ResourceKind::Service, ResourceKind::Route];

pub struct SampleWorkload<'a> {
    cluster: &'a dyn ClusterClient,
    name: String,
    namespace: String,
    image: String,
    timing: Timing,
    state: WorkloadState,
    created: Vec<ResourceKind>,
}

impl<'a> SampleWorkload<'a> {
    pub fn new(
        cluster: &'a dyn ClusterClient,
        name: impl Into<String>,
        namespace: impl Into<String>,
        image: impl Into<String>,
        timing: Timing,
    ) -> Self {
        Self {
            cluster,
            name: name.into(),
            namespace: namespace.into(),
            image: image.into(),
            timing,
            state: WorkloadState::Absent,
            created: Vec::new(),
        }
    }

    pub fn state(&self) -> WorkloadState {
        self.state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn expect_state(&self, expected: WorkloadState, action: &str) -> Result<()> {
        if self.state != expected {
            return Err(Error::InvalidTransition {
                state: self.state.to_string(),
                action: action.to_string(),
            });
        }
        Ok(())
    }

    fn path(&self) -> String {
        object_path(&self.name, Some(&self.namespace))
    }

    /// Absent → Creating: pod (waiting for it to run), service, route.
    pub async fn create(&mut self) -> Result<()> {
        self.expect_state(WorkloadState::Absent, "create")?;
        self.state = WorkloadState::Creating;
        info!(workload = %self.path(), "creating sample workload");

        if let Err(e) = self.create_all().await {
            warn!(workload = %self.path(), error = %e, "sample workload creation failed, rolling back");
            self.cleanup().await;
            return Err(e);
        }
        Ok(())
    }

    async fn create_all(&mut self) -> Result<()> {
        for kind in CREATE_ORDER {
            let obj = match kind {
                ResourceKind::Pod => sample_pod(&self.name, &self.namespace, &self.image)?,
                ResourceKind::Service => sample_service(&self.name, &self.namespace)?,
                _ => sample_route(&self.name, &self.namespace)?,
            };
            self.cluster.create(kind, &obj).await?;
            self.created.push(kind);

            if kind == ResourceKind::Pod {
                self.await_pod_running().await?;
            }
        }
        Ok(())
    }

    async fn await_pod_running(&self) -> Result<()> {
        let (cluster, name, ns) = (self.cluster, self.name.as_str(), self.namespace.as_str());
        eventually(
            &format!("pod {} to be running", self.path()),
            self.timing.poll_interval,
            self.timing.convergence_timeout,
            move || async move {
                match cluster.get(ResourceKind::Pod, name, Some(ns)).await {
                    Ok(obj) => {
                        let pod: Pod = parse_as(&obj)?;
                        Ok(pod.status.and_then(|s| s.phase).as_deref() == Some("Running"))
                    }
                    Err(e) if e.is_not_found() => Ok(false),
                    Err(e) => Err(e),
                }
            },
        )
        .await
    }

    /// Creating → Present once the service can be fetched.
    pub async fn await_present(&mut self) -> Result<()> {
        self.expect_state(WorkloadState::Creating, "await presence of")?;
        let (cluster, name, ns) = (self.cluster, self.name.as_str(), self.namespace.as_str());
        eventually(
            &format!("service {} to be created", self.path()),
            self.timing.poll_interval,
            self.timing.convergence_timeout,
            move || async move {
                match cluster.get(ResourceKind::Service, name, Some(ns)).await {
                    Ok(_) => Ok(true),
                    Err(e) if e.is_not_found() => Ok(false),
                    Err(e) => Err(e),
                }
            },
        )
        .await?;
        self.state = WorkloadState::Present;
        info!(workload = %self.path(), "sample workload present");
        Ok(())
    }

    /// Present → Deleting.
    pub async fn delete_service(&mut self) -> Result<()> {
        self.expect_state(WorkloadState::Present, "delete")?;
        self.cluster
            .delete(ResourceKind::Service, &self.name, Some(&self.namespace))
            .await?;
        self.created.retain(|k| *k != ResourceKind::Service);
        self.state = WorkloadState::Deleting;
        Ok(())
    }

    /// Deleting → Absent once the service can no longer be fetched, then
    /// remove the route and pod so nothing is left behind.
    pub async fn await_absent(&mut self) -> Result<()> {
        self.expect_state(WorkloadState::Deleting, "await absence of")?;
        let (cluster, name, ns) = (self.cluster, self.name.as_str(), self.namespace.as_str());
        eventually(
            &format!("service {} to be deleted", self.path()),
            self.timing.poll_interval,
            self.timing.convergence_timeout,
            move || async move {
                match cluster.get(ResourceKind::Service, name, Some(ns)).await {
                    Ok(_) => Ok(false),
                    Err(e) if e.is_not_found() => Ok(true),
                    Err(e) => Err(e),
                }
            },
        )
        .await?;

        self.teardown().await?;
        self.state = WorkloadState::Absent;
        info!(workload = %self.path(), "sample workload removed");
        Ok(())
    }

    /// Delete the remaining objects, newest first. Already-gone is fine.
    async fn teardown(&mut self) -> Result<()> {
        while let Some(kind) = self.created.pop() {
            match self
                .cluster
                .delete(kind, &self.name, Some(&self.namespace))
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    self.created.push(kind);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Best-effort removal of every sample object, whatever state the
    /// workload is in. Failures are logged so they don't mask the error that
    /// led here; objects already gone are skipped. Leaves the workload Absent.
    pub async fn cleanup(&mut self) {
        for kind in CREATE_ORDER.iter().rev().copied() {
            match self
                .cluster
                .delete(kind, &self.name, Some(&self.namespace))
                .await
            {
                Ok(()) => info!(%kind, workload = %self.path(), "cleaned up sample object"),
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    warn!(%kind, workload = %self.path(), error = %e, "cleanup delete failed")
                }
            }
        }
        self.created.clear();
        self.state = WorkloadState::Absent;
    }
}
