//! In-memory cluster for testing
//!
//! [`MockApplier`] and [`MockSecretStore`] keep cluster state in memory and
//! count the calls made, so installation flows can be tested without a
//! Kubernetes cluster. Clones share state.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use crate::error::{KubeError, Result, api_error};
use crate::manifest::ManifestObject;
use crate::materializer::ManifestApplier;
use crate::resources::AppliedResource;
use crate::secrets::{SecretSpec, SecretStore};

const CLUSTER_SCOPED: [&str; 4] = [
    "Namespace",
    "CustomResourceDefinition",
    "ClusterRole",
    "ClusterRoleBinding",
];

/// Failure an apply attempt should report
#[derive(Debug, Clone)]
pub enum ScriptedFailure {
    /// API error response with this status code
    Status(u16),
    /// Resource type not served by the cluster
    UnknownType { api_version: String, kind: String },
}

impl ScriptedFailure {
    fn to_error(&self) -> KubeError {
        match self {
            ScriptedFailure::Status(code) => KubeError::Api(api_error(*code, "Scripted", "scripted failure")),
            ScriptedFailure::UnknownType { api_version, kind } => KubeError::UnknownResource {
                api_version: api_version.clone(),
                kind: kind.clone(),
            },
        }
    }
}

/// Counts of applier calls
#[derive(Debug, Default, Clone)]
pub struct ApplierCounts {
    pub attempts: usize,
    pub refreshes: usize,
}

/// In-memory manifest applier
#[derive(Clone, Default)]
pub struct MockApplier {
    failure: Option<ScriptedFailure>,
    /// Failures left before attempts succeed; `None` fails forever
    remaining: Arc<RwLock<Option<u32>>>,
    cluster: Arc<RwLock<BTreeSet<String>>>,
    counts: Arc<RwLock<ApplierCounts>>,
}

impl MockApplier {
    /// Applier whose attempts always succeed
    pub fn new() -> Self {
        Self::default()
    }

    /// Every attempt fails
    pub fn always(mut self, failure: ScriptedFailure) -> Self {
        self.failure = Some(failure);
        *self.remaining.write().unwrap() = None;
        self
    }

    /// The first `times` attempts fail
    pub fn failing_times(mut self, times: u32, failure: ScriptedFailure) -> Self {
        self.failure = Some(failure);
        *self.remaining.write().unwrap() = Some(times);
        self
    }

    pub fn counts(&self) -> ApplierCounts {
        self.counts.read().unwrap().clone()
    }

    /// Resources present in the cluster, sorted
    pub fn resources(&self) -> Vec<String> {
        self.cluster.read().unwrap().iter().cloned().collect()
    }

    fn scripted_failure(&self) -> Option<KubeError> {
        let failure = self.failure.as_ref()?;
        let mut remaining = self.remaining.write().unwrap();
        match remaining.as_mut() {
            None => Some(failure.to_error()),
            Some(0) => None,
            Some(n) => {
                *n -= 1;
                Some(failure.to_error())
            }
        }
    }
}

#[async_trait]
impl ManifestApplier for MockApplier {
    async fn apply(
        &mut self,
        objects: &[ManifestObject],
        default_namespace: &str,
    ) -> Result<Vec<AppliedResource>> {
        self.counts.write().unwrap().attempts += 1;
        if let Some(err) = self.scripted_failure() {
            return Err(err);
        }

        let mut cluster = self.cluster.write().unwrap();
        Ok(objects
            .iter()
            .map(|object| {
                let namespace = if CLUSTER_SCOPED.contains(&object.gvk.kind.as_str()) {
                    None
                } else {
                    Some(
                        object
                            .obj
                            .metadata
                            .namespace
                            .clone()
                            .unwrap_or_else(|| default_namespace.to_string()),
                    )
                };
                let resource = AppliedResource {
                    kind: object.gvk.kind.clone(),
                    name: object.name().to_string(),
                    namespace,
                    created: false,
                };
                let created = cluster.insert(resource.display_name());
                AppliedResource { created, ..resource }
            })
            .collect())
    }

    async fn refresh(&mut self) -> Result<()> {
        self.counts.write().unwrap().refreshes += 1;
        Ok(())
    }
}

/// Counts of secret store writes
#[derive(Debug, Default, Clone)]
pub struct StoreCounts {
    pub secret_writes: usize,
    pub config_writes: usize,
}

#[derive(Default)]
struct StoreState {
    /// (namespace, name) -> secret
    secrets: BTreeMap<(String, String), SecretSpec>,
    /// (namespace, name) -> config map data
    config_maps: BTreeMap<(String, String), BTreeMap<String, String>>,
    counts: StoreCounts,
}

/// In-memory secret store
#[derive(Clone, Default)]
pub struct MockSecretStore {
    state: Arc<RwLock<StoreState>>,
    failure: Option<u16>,
}

impl MockSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write fails with this API status
    pub fn failing(mut self, code: u16) -> Self {
        self.failure = Some(code);
        self
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<SecretSpec> {
        self.state
            .read()
            .unwrap()
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn secret_count(&self) -> usize {
        self.state.read().unwrap().secrets.len()
    }

    pub fn config_map(&self, namespace: &str, name: &str) -> Option<BTreeMap<String, String>> {
        self.state
            .read()
            .unwrap()
            .config_maps
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn counts(&self) -> StoreCounts {
        self.state.read().unwrap().counts.clone()
    }

    fn check_failure(&self) -> Result<()> {
        match self.failure {
            Some(code) => Err(KubeError::Api(api_error(code, "Scripted", "scripted failure"))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SecretStore for MockSecretStore {
    async fn put_secret(&self, namespace: &str, secret: &SecretSpec) -> Result<()> {
        self.check_failure()?;
        let mut state = self.state.write().unwrap();
        state.counts.secret_writes += 1;
        state
            .secrets
            .insert((namespace.to_string(), secret.name.clone()), secret.clone());
        Ok(())
    }

    async fn set_config_entries(
        &self,
        namespace: &str,
        name: &str,
        entries: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.check_failure()?;
        let mut state = self.state.write().unwrap();
        state.counts.config_writes += 1;
        state
            .config_maps
            .entry((namespace.to_string(), name.to_string()))
            .or_default()
            .extend(entries.clone());
        Ok(())
    }
}
