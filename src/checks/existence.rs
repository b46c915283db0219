use std::fmt;

use kube::api::DynamicObject;
use kube::ResourceExt;
use tracing::debug;

use crate::cluster::ClusterClient;
use crate::error::{Error, Result};
use crate::resources::{object_path, ResourceKind};

/// How objects are picked out of the cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selector {
    Exact(String),
    Prefix(String),
}

/// Where a lookup or listing happens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scope {
    Namespaced(String),
    AllNamespaces,
    Cluster,
}

impl Scope {
    fn namespace(&self) -> Option<&str> {
        match self {
            Self::Namespaced(ns) => Some(ns),
            Self::AllNamespaces | Self::Cluster => None,
        }
    }
}

/// "At least one `kind` matching `selector` exists in `scope`."
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExistenceCheck {
    pub kind: ResourceKind,
    pub scope: Scope,
    pub selector: Selector,
}

impl ExistenceCheck {
    pub fn exact(kind: ResourceKind, scope: Scope, name: impl Into<String>) -> Self {
        Self {
            kind,
            scope,
            selector: Selector::Exact(name.into()),
        }
    }

    pub fn prefix(kind: ResourceKind, scope: Scope, prefix: impl Into<String>) -> Self {
        Self {
            kind,
            scope,
            selector: Selector::Prefix(prefix.into()),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(name) => f.write_str(name),
            Self::Prefix(prefix) => write!(f, "with prefix {prefix}"),
        }
    }
}

fn describe(selector: &Selector, ns: Option<&str>) -> String {
    match (selector, ns) {
        (Selector::Exact(name), _) => object_path(name, ns),
        (Selector::Prefix(_), Some(ns)) => format!("{selector} in {ns}"),
        (Selector::Prefix(_), None) => selector.to_string(),
    }
}

/// Names in `items` starting with `prefix`.
pub fn names_with_prefix<'a>(items: &'a [DynamicObject], prefix: &str) -> Vec<&'a str> {
    items
        .iter()
        .filter_map(|o| o.metadata.name.as_deref())
        .filter(|n| n.starts_with(prefix))
        .collect()
}

/// Run one existence check.
///
/// Exact selectors do a direct get; a missing object becomes
/// [`Error::NotFound`] naming the kind and path. Prefix selectors list the
/// scope and pass if any name matches.
pub async fn check_exists(cluster: &dyn ClusterClient, check: &ExistenceCheck) -> Result<()> {
    let ns = check.scope.namespace();
    match &check.selector {
        Selector::Exact(name) => {
            let obj = cluster.get(check.kind, name, ns).await?;
            debug!(kind = %check.kind, name = %obj.name_any(), "found object");
            Ok(())
        }
        Selector::Prefix(prefix) => {
            let items = cluster.list(check.kind, ns).await?;
            let matches = names_with_prefix(&items, prefix);
            match matches.first() {
                Some(first) => {
                    debug!(kind = %check.kind, %prefix, %first, count = matches.len(), "found objects");
                    Ok(())
                }
                None => Err(Error::not_found(check.kind, describe(&check.selector, ns))),
            }
        }
    }
}
