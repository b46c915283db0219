//! Verification steps composed by the suite's test cases.
//!
//! Each check is a plain async function over the client traits, so the same
//! code runs against a live cluster and against the in-memory fakes.

mod deployment;
mod existence;
mod health;
mod upgrade;

pub use deployment::{await_deployment_available, check_ready_replicas, deployment_available};
pub use existence::{check_exists, names_with_prefix, ExistenceCheck, Scope, Selector};
pub use health::{check_health, check_monitoring_objects, HealthSample};
pub use upgrade::trigger_upgrade;
