//! rmo-e2e: end-to-end verification of the Route Monitor Operator.
//!
//! The suite talks to the cluster and to the metrics stack through two
//! narrow traits ([`cluster::ClusterClient`], [`metrics::MetricsClient`]).
//! Production implementations use kube-rs and reqwest; `fake` (feature
//! `test-utils`) holds in-memory stand-ins for tests.

pub mod checks;
pub mod cluster;
pub mod config;
pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod fake;
pub mod metrics;
pub mod olm;
pub mod poll;
pub mod resources;
pub mod suite;
pub mod workload;
