//! Full create/delete cycle of the sample workload on a real API server.

use rmo_e2e::cluster::ClusterClient;
use rmo_e2e::resources::ResourceKind;
use rmo_e2e::workload::{SampleWorkload, WorkloadState};

use crate::common::{keep_pod_running, timing, TestContext};

const NAME: &str = "routemonitor-e2e-test";

#[tokio::test]
async fn sample_workload_is_created_and_fully_removed() {
    let ctx = TestContext::new().await;
    let kubelet = keep_pod_running(ctx.client.clone(), ctx.ns.clone(), NAME.to_string());

    let mut workload = SampleWorkload::new(
        &ctx.cluster,
        NAME,
        &ctx.ns,
        "quay.io/openshift/origin-hello-openshift:latest",
        timing(),
    );
    workload.create().await.unwrap();
    for kind in [ResourceKind::Pod, ResourceKind::Service, ResourceKind::Route] {
        ctx.cluster
            .get(kind, NAME, Some(&ctx.ns))
            .await
            .unwrap_or_else(|e| panic!("{kind} missing after create: {e}"));
    }
    workload.await_present().await.unwrap();

    workload.delete_service().await.unwrap();
    workload.await_absent().await.unwrap();
    kubelet.abort();

    assert_eq!(workload.state(), WorkloadState::Absent);
    for kind in [ResourceKind::Service, ResourceKind::Route, ResourceKind::Pod] {
        let err = ctx.cluster.get(kind, NAME, Some(&ctx.ns)).await.unwrap_err();
        assert!(err.is_not_found(), "{kind} left behind: {err:?}");
    }
}

#[tokio::test]
async fn creation_into_missing_namespace_rolls_back() {
    let ctx = TestContext::new().await;
    let ns = format!("{}-missing", ctx.ns);
    let mut workload = SampleWorkload::new(&ctx.cluster, NAME, &ns, "img:latest", timing());

    assert!(workload.create().await.is_err());
    assert_eq!(workload.state(), WorkloadState::Absent);
}
