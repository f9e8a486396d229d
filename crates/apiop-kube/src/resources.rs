//! Server-side apply of manifest objects
//!
//! Resolves each object's type through the discovery cache, fills in the
//! operator namespace for namespaced objects that do not name one, and
//! applies with a forced field manager so re-runs take ownership back.

use async_trait::async_trait;
use kube::{
    Client,
    api::{Api, DynamicObject, Patch, PatchParams},
    discovery::{ApiCapabilities, ApiResource, Discovery, Scope},
};

use crate::error::{KubeError, Result};
use crate::manifest::ManifestObject;
use crate::materializer::ManifestApplier;

/// Field manager name for Server-Side Apply
pub const FIELD_MANAGER: &str = "apiop";

/// Result of applying a single resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedResource {
    pub kind: String,
    pub name: String,
    /// None for cluster-scoped resources
    pub namespace: Option<String>,
    /// Whether it was created (true) or updated (false)
    pub created: bool,
}

impl AppliedResource {
    pub fn display_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/{}/{}", ns, self.kind, self.name),
            None => format!("{}/{}", self.kind, self.name),
        }
    }
}

/// Applies manifest objects to the cluster
pub struct ResourceManager {
    client: Client,
    /// Cached discovery information
    discovery: Discovery,
}

impl ResourceManager {
    pub async fn new(client: Client) -> Result<Self> {
        let discovery = Discovery::new(client.clone()).run().await?;
        Ok(Self { client, discovery })
    }

    /// Refresh discovery cache (call after CRD changes)
    pub async fn refresh_discovery(&mut self) -> Result<()> {
        self.discovery = Discovery::new(self.client.clone()).run().await?;
        Ok(())
    }

    fn resolve(&self, object: &ManifestObject) -> Result<(ApiResource, ApiCapabilities)> {
        self.discovery
            .resolve_gvk(&object.gvk)
            .ok_or_else(|| KubeError::UnknownResource {
                api_version: object.api_version().to_string(),
                kind: object.gvk.kind.clone(),
            })
    }

    async fn apply_object(
        &self,
        object: &ManifestObject,
        default_namespace: &str,
    ) -> Result<AppliedResource> {
        let (api_resource, capabilities) = self.resolve(object)?;

        let mut obj = object.obj.clone();
        let api: Api<DynamicObject> = if capabilities.scope == Scope::Namespaced {
            let ns = obj
                .metadata
                .namespace
                .get_or_insert_with(|| default_namespace.to_string())
                .clone();
            Api::namespaced_with(self.client.clone(), &ns, &api_resource)
        } else {
            Api::all_with(self.client.clone(), &api_resource)
        };

        let name = object.name().to_string();
        let mut applied = AppliedResource {
            kind: object.gvk.kind.clone(),
            name: name.clone(),
            namespace: obj.metadata.namespace.clone(),
            created: false,
        };
        let resource_name = applied.display_name();
        let failed = |source: kube::Error| KubeError::ApplyFailed {
            resource: resource_name.clone(),
            source,
        };

        let exists = api.get_opt(&name).await.map_err(failed)?.is_some();

        let mut params = PatchParams::apply(FIELD_MANAGER);
        params.force = true;
        api.patch(&name, &params, &Patch::Apply(&obj))
            .await
            .map_err(failed)?;

        applied.created = !exists;
        tracing::debug!(resource = %resource_name, created = applied.created, "applied");
        Ok(applied)
    }
}

#[async_trait]
impl ManifestApplier for ResourceManager {
    async fn apply(
        &mut self,
        objects: &[ManifestObject],
        default_namespace: &str,
    ) -> Result<Vec<AppliedResource>> {
        let mut applied = Vec::with_capacity(objects.len());
        for object in objects {
            applied.push(self.apply_object(object, default_namespace).await?);
        }
        Ok(applied)
    }

    async fn refresh(&mut self) -> Result<()> {
        self.refresh_discovery().await
    }
}
