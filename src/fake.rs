//! In-memory implementations of the client traits for tests.
//!
//! Objects live in a map keyed by kind, namespace and name. Failures are
//! scripted: a number of transient errors to return before answering, a
//! fixed upgrade outcome, and so on.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use kube::api::{DynamicObject, ObjectMeta};
use serde_json::{json, Value};

use crate::cluster::ClusterClient;
use crate::error::{Error, Result};
use crate::metrics::{MetricsClient, MonitoringKind, Sample};
use crate::resources::{object_path, ResourceKind};

type Key = (ResourceKind, Option<String>, String);

fn key(kind: ResourceKind, name: &str, namespace: Option<&str>) -> Key {
    let ns = if kind.is_cluster_scoped() {
        None
    } else {
        namespace.map(str::to_string)
    };
    (kind, ns, name.to_string())
}

/// Minimal object with just a name and namespace, plus `data` merged in.
pub fn object(name: &str, namespace: Option<&str>, data: serde_json::Value) -> DynamicObject {
    DynamicObject {
        types: None,
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: namespace.map(str::to_string),
            ..Default::default()
        },
        data,
    }
}

#[derive(Default)]
struct ClusterState {
    objects: BTreeMap<Key, DynamicObject>,
    transient_failures: u32,
    unreadable: BTreeSet<ResourceKind>,
    create_failures: BTreeMap<ResourceKind, String>,
    upgrade_result: Option<Result<(), String>>,
    sa_tokens: BTreeMap<(String, String), String>,
    upgrades: Vec<(String, String)>,
    deletes: Vec<(ResourceKind, String)>,
    /// Objects that survive this many `get`s after being deleted.
    linger_gets: u32,
    lingering: VecDeque<Key>,
}

#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<ClusterState>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, kind: ResourceKind, namespace: Option<&str>, obj: DynamicObject) {
        let name = obj.metadata.name.clone().unwrap_or_default();
        self.lock().objects.insert(key(kind, &name, namespace), obj);
    }

    /// Insert an object carrying only a name.
    pub fn add(&self, kind: ResourceKind, name: &str, namespace: Option<&str>) {
        self.insert(kind, namespace, object(name, namespace, json!({})));
    }

    pub fn remove(&self, kind: ResourceKind, name: &str, namespace: Option<&str>) {
        self.lock().objects.remove(&key(kind, name, namespace));
    }

    pub fn contains(&self, kind: ResourceKind, name: &str, namespace: Option<&str>) -> bool {
        self.lock()
            .objects
            .contains_key(&key(kind, name, namespace))
    }

    /// Fail the next `n` reads with a transport error.
    pub fn fail_next_reads(&self, n: u32) {
        self.lock().transient_failures = n;
    }

    /// Every `get` of `kind` fails with a transport error from now on.
    pub fn fail_reads_of(&self, kind: ResourceKind) {
        self.lock().unreadable.insert(kind);
    }

    pub fn fail_create(&self, kind: ResourceKind, message: impl Into<String>) {
        self.lock().create_failures.insert(kind, message.into());
    }

    pub fn set_upgrade_result(&self, result: Result<(), String>) {
        self.lock().upgrade_result = Some(result);
    }

    pub fn set_service_account_token(&self, namespace: &str, name: &str, token: &str) {
        self.lock()
            .sa_tokens
            .insert((namespace.to_string(), name.to_string()), token.to_string());
    }

    /// Deleted objects stay visible to `get` for `n` further reads.
    pub fn linger_after_delete(&self, n: u32) {
        self.lock().linger_gets = n;
    }

    pub fn upgrades(&self) -> Vec<(String, String)> {
        self.lock().upgrades.clone()
    }

    pub fn deletes(&self) -> Vec<(ResourceKind, String)> {
        self.lock().deletes.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take_transient(state: &mut ClusterState) -> Result<()> {
        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(Error::Transport("connection reset by peer".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn get(
        &self,
        kind: ResourceKind,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<DynamicObject> {
        let mut state = self.lock();
        Self::take_transient(&mut state)?;
        if state.unreadable.contains(&kind) {
            return Err(Error::Transport(format!("{kind} read timed out")));
        }
        let k = key(kind, name, namespace);
        if state.lingering.contains(&k) {
            if state.linger_gets == 0 {
                state.lingering.retain(|l| l != &k);
                state.objects.remove(&k);
            } else {
                state.linger_gets -= 1;
            }
        }
        state
            .objects
            .get(&k)
            .cloned()
            .ok_or_else(|| Error::not_found(kind, object_path(name, namespace)))
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<DynamicObject>> {
        let mut state = self.lock();
        Self::take_transient(&mut state)?;
        let ns = if kind.is_cluster_scoped() { None } else { namespace };
        Ok(state
            .objects
            .iter()
            .filter(|((k, obj_ns, _), _)| {
                *k == kind && (ns.is_none() || obj_ns.as_deref() == ns)
            })
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn create(&self, kind: ResourceKind, obj: &DynamicObject) -> Result<()> {
        let mut state = self.lock();
        if let Some(msg) = state.create_failures.get(&kind) {
            return Err(Error::Transport(msg.clone()));
        }
        let name = obj.metadata.name.clone().unwrap_or_default();
        let k = key(kind, &name, obj.metadata.namespace.as_deref());
        if state.objects.contains_key(&k) {
            return Err(Error::Transport(format!(
                "{kind} {} already exists",
                object_path(&name, obj.metadata.namespace.as_deref())
            )));
        }
        let mut obj = obj.clone();
        // Pods start running at once; there is no kubelet to wait for.
        if kind == ResourceKind::Pod {
            obj.data["status"] = json!({ "phase": "Running" });
        }
        state.objects.insert(k, obj);
        Ok(())
    }

    async fn delete(
        &self,
        kind: ResourceKind,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<()> {
        let mut state = self.lock();
        let k = key(kind, name, namespace);
        if !state.objects.contains_key(&k) || state.lingering.contains(&k) {
            return Err(Error::not_found(kind, object_path(name, namespace)));
        }
        state.deletes.push((kind, name.to_string()));
        if state.linger_gets > 0 {
            state.lingering.push_back(k);
        } else {
            state.objects.remove(&k);
        }
        Ok(())
    }

    async fn patch(
        &self,
        kind: ResourceKind,
        name: &str,
        namespace: Option<&str>,
        patch: &serde_json::Value,
    ) -> Result<DynamicObject> {
        let mut state = self.lock();
        let obj = state
            .objects
            .get_mut(&key(kind, name, namespace))
            .ok_or_else(|| Error::not_found(kind, object_path(name, namespace)))?;
        merge_patch(&mut obj.data, patch);
        Ok(obj.clone())
    }

    async fn trigger_upgrade(&self, operator: &str, namespace: &str) -> Result<()> {
        let mut state = self.lock();
        state
            .upgrades
            .push((operator.to_string(), namespace.to_string()));
        match state.upgrade_result.clone().unwrap_or(Ok(())) {
            Ok(()) => Ok(()),
            Err(msg) => Err(Error::Transport(msg)),
        }
    }

    async fn service_account_token(&self, name: &str, namespace: &str) -> Result<String> {
        self.lock()
            .sa_tokens
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| {
                Error::not_found(ResourceKind::ServiceAccount, object_path(name, Some(namespace)))
            })
    }
}

/// RFC 7386 merge: objects merge key by key, `null` removes, anything else
/// replaces.
fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(fields) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = json!({});
    }
    if let Value::Object(existing) = target {
        for (k, v) in fields {
            if v.is_null() {
                existing.remove(k);
            } else {
                merge_patch(existing.entry(k.clone()).or_insert(Value::Null), v);
            }
        }
    }
}

// ── Metrics ──────────────────────────────────────────────────────────────────

#[derive(Default)]
struct MetricsState {
    series: BTreeMap<String, Vec<f64>>,
    query_error: Option<String>,
    rules: Vec<(MonitoringKind, String, String)>,
    queries: Vec<String>,
}

#[derive(Default)]
pub struct FakeMetrics {
    state: Mutex<MetricsState>,
}

impl FakeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MetricsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answer `expr` with one row per value.
    pub fn set_series(&self, expr: &str, values: Vec<f64>) {
        self.lock().series.insert(expr.to_string(), values);
    }

    pub fn fail_queries(&self, message: impl Into<String>) {
        self.lock().query_error = Some(message.into());
    }

    pub fn add_rule(&self, kind: MonitoringKind, name: &str, namespace: &str) {
        self.lock()
            .rules
            .push((kind, name.to_string(), namespace.to_string()));
    }

    pub fn queries(&self) -> Vec<String> {
        self.lock().queries.clone()
    }
}

#[async_trait]
impl MetricsClient for FakeMetrics {
    async fn instant_query(&self, expr: &str) -> Result<Vec<Sample>> {
        let mut state = self.lock();
        state.queries.push(expr.to_string());
        if let Some(ref msg) = state.query_error {
            return Err(Error::Transport(msg.clone()));
        }
        Ok(state
            .series
            .get(expr)
            .map(|values| {
                values
                    .iter()
                    .map(|v| Sample {
                        metric: BTreeMap::new(),
                        value: *v,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_monitoring_rule(
        &self,
        kind: MonitoringKind,
        name: &str,
        namespace: &str,
    ) -> Result<DynamicObject> {
        let state = self.lock();
        state
            .rules
            .iter()
            .find(|(k, n, ns)| *k == kind && n == name && ns == namespace)
            .map(|(_, n, ns)| object(n, Some(ns), json!({})))
            .ok_or_else(|| Error::not_found(kind.resource_kind(), object_path(name, Some(namespace))))
    }
}
