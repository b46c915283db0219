//! Integration tests using envtest. Each run spins up a real API server + etcd.
//!
//! Each submodule drives the kube-backed clients and the suite's checks
//! against that server. The shared harness and helpers live in `common.rs`.
//!
//! Requirements: Go toolchain + clang (for rust2go/envtest build).
//! Run with: `cargo test --test integration`

mod common;

mod deployment;
mod monitoring;
mod sample_workload;
