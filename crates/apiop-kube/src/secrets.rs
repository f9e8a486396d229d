//! Registry credentials as cluster secrets
//!
//! | Registry     | Secret                 | Type                             | Key                 |
//! |--------------|------------------------|----------------------------------|---------------------|
//! | DOCKER_HUB   | `registry-credentials` | `kubernetes.io/dockerconfigjson` | `.dockerconfigjson` |
//! | HTTP         | `registry-credentials` | `kubernetes.io/dockerconfigjson` | `.dockerconfigjson` |
//! | AMAZON_ECR   | `aws-credentials`      | `Opaque`                         | `credentials`       |
//! | GCR          | `gcr-credentials`      | `Opaque`                         | `gcr-key.json`      |
//!
//! Anonymous HTTP registries get no secret. Every registry type updates the
//! controller config map with `registryType` and `dockerRegistry`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use kube::api::{Api, Patch, PatchParams};
use thiserror::Error;

use apiop_core::{CredentialError, CredentialSet, RegistryType};

use crate::error::{KubeError, Result};
use crate::resources::FIELD_MANAGER;

pub const DOCKER_CONFIG_SECRET: &str = "registry-credentials";
pub const AWS_SECRET: &str = "aws-credentials";
pub const GCR_SECRET: &str = "gcr-credentials";

pub const DOCKER_CONFIG_TYPE: &str = "kubernetes.io/dockerconfigjson";
pub const OPAQUE_TYPE: &str = "Opaque";

const DOCKER_CONFIG_KEY: &str = ".dockerconfigjson";
const AWS_KEY: &str = "credentials";
const GCR_KEY: &str = "gcr-key.json";

/// Docker Hub's registry server in docker config files
pub const DOCKER_HUB_SERVER: &str = "https://index.docker.io/v1/";

/// Config map keys read by the controller
pub const REGISTRY_TYPE_KEY: &str = "registryType";
pub const REPOSITORY_KEY: &str = "dockerRegistry";

const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Field manager of the registry entries in the controller config map
///
/// Distinct from [`FIELD_MANAGER`], which owns the rest of the config map
/// through the bundle apply. Applying the entries under the bundle's manager
/// would prune every other key the bundle set.
pub const REGISTRY_FIELD_MANAGER: &str = "apiop-registry";

/// Secret to write; data values are never printed
#[derive(Clone, PartialEq, Eq)]
pub struct SecretSpec {
    pub name: String,
    pub type_: String,
    pub data: BTreeMap<String, Vec<u8>>,
}

impl fmt::Debug for SecretSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretSpec")
            .field("name", &self.name)
            .field("type_", &self.type_)
            .field("keys", &self.data.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Cluster-visible storage for secrets and controller settings
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Create or overwrite a secret
    async fn put_secret(&self, namespace: &str, secret: &SecretSpec) -> Result<()>;

    /// Set keys of a config map, leaving the keys set by the bundle in place
    async fn set_config_entries(
        &self,
        namespace: &str,
        name: &str,
        entries: &BTreeMap<String, String>,
    ) -> Result<()>;
}

/// Secret store backed by the Kubernetes API (server-side apply)
pub struct KubeSecretStore {
    client: Client,
}

impl KubeSecretStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn apply_params(manager: &str) -> PatchParams {
        let mut params = PatchParams::apply(manager);
        params.force = true;
        params
    }
}

/// Apply parameters and body for the registry entries of a config map
fn config_entries_patch(
    namespace: &str,
    name: &str,
    entries: &BTreeMap<String, String>,
) -> (PatchParams, ConfigMap) {
    let config_map = ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(entries.clone()),
        ..Default::default()
    };
    (
        KubeSecretStore::apply_params(REGISTRY_FIELD_MANAGER),
        config_map,
    )
}

fn managed_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(MANAGED_BY_LABEL.to_string(), "apiop".to_string())])
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn put_secret(&self, namespace: &str, spec: &SecretSpec) -> Result<()> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let data = spec
            .data
            .iter()
            .map(|(k, v)| (k.clone(), ByteString(v.clone())))
            .collect();

        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(spec.name.clone()),
                namespace: Some(namespace.to_string()),
                labels: Some(managed_labels()),
                ..Default::default()
            },
            type_: Some(spec.type_.clone()),
            data: Some(data),
            ..Default::default()
        };

        api.patch(
            &spec.name,
            &Self::apply_params(FIELD_MANAGER),
            &Patch::Apply(&secret),
        )
            .await?;
        Ok(())
    }

    async fn set_config_entries(
        &self,
        namespace: &str,
        name: &str,
        entries: &BTreeMap<String, String>,
    ) -> Result<()> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let (params, config_map) = config_entries_patch(namespace, name, entries);

        api.patch(name, &params, &Patch::Apply(&config_map)).await?;
        Ok(())
    }
}

/// Failure to persist registry credentials
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("credentials file '{}' is not readable: {source}", .path.display())]
    KeyFileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Credentials(CredentialError),

    #[error("writing to the cluster failed: {0}")]
    Store(#[from] KubeError),
}

impl From<CredentialError> for PersistError {
    fn from(e: CredentialError) -> Self {
        match e {
            CredentialError::KeyFileUnreadable { path, source } => {
                PersistError::KeyFileUnreadable { path, source }
            }
            other => PersistError::Credentials(other),
        }
    }
}

/// What was written
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistReport {
    /// Names of secrets written
    pub secrets: Vec<String>,
    pub config_map: String,
}

/// Writes resolved credentials into the operator namespace
#[derive(Debug, Clone)]
pub struct SecretPersister {
    namespace: String,
    controller_config: String,
}

impl SecretPersister {
    pub fn new(namespace: impl Into<String>, controller_config: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            controller_config: controller_config.into(),
        }
    }

    pub async fn persist(
        &self,
        store: &dyn SecretStore,
        credentials: &CredentialSet,
    ) -> std::result::Result<PersistReport, PersistError> {
        let mut report = PersistReport {
            config_map: self.controller_config.clone(),
            ..Default::default()
        };

        match registry_secret(credentials)? {
            Some(secret) => {
                store.put_secret(&self.namespace, &secret).await?;
                tracing::info!(
                    namespace = %self.namespace,
                    secret = %secret.name,
                    registry = %credentials.registry,
                    "registry secret written"
                );
                report.secrets.push(secret.name);
            }
            None => {
                tracing::info!(registry = %credentials.registry, "anonymous registry, no secret written");
            }
        }

        let entries = BTreeMap::from([
            (REGISTRY_TYPE_KEY.to_string(), credentials.registry.as_str().to_string()),
            (REPOSITORY_KEY.to_string(), credentials.repository.clone()),
        ]);
        store
            .set_config_entries(&self.namespace, &self.controller_config, &entries)
            .await?;
        tracing::debug!(config_map = %self.controller_config, "controller registry settings updated");

        Ok(report)
    }
}

/// The secret for a credential set; `None` for anonymous registries
pub fn registry_secret(
    credentials: &CredentialSet,
) -> std::result::Result<Option<SecretSpec>, PersistError> {
    if credentials.is_anonymous() {
        return Ok(None);
    }

    let secret = match credentials.registry {
        RegistryType::DockerHub | RegistryType::Http => {
            let username = credentials
                .username
                .as_deref()
                .ok_or(CredentialError::MissingCredential { field: "username" })?;
            let password = credentials
                .resolve_password()?
                .ok_or(CredentialError::MissingCredential { field: "password" })?;
            let server = match credentials.registry {
                RegistryType::DockerHub => DOCKER_HUB_SERVER.to_string(),
                _ => registry_host(&credentials.repository).to_string(),
            };
            let config = docker_config(&server, username, password.expose())?;
            SecretSpec {
                name: DOCKER_CONFIG_SECRET.to_string(),
                type_: DOCKER_CONFIG_TYPE.to_string(),
                data: BTreeMap::from([(DOCKER_CONFIG_KEY.to_string(), config)]),
            }
        }
        RegistryType::AmazonEcr => opaque(AWS_SECRET, AWS_KEY, key_file_content(credentials)?),
        RegistryType::Gcr => opaque(GCR_SECRET, GCR_KEY, key_file_content(credentials)?),
    };

    Ok(Some(secret))
}

fn opaque(name: &str, key: &str, content: Vec<u8>) -> SecretSpec {
    SecretSpec {
        name: name.to_string(),
        type_: OPAQUE_TYPE.to_string(),
        data: BTreeMap::from([(key.to_string(), content)]),
    }
}

fn key_file_content(credentials: &CredentialSet) -> std::result::Result<Vec<u8>, PersistError> {
    Ok(credentials
        .read_key_file()?
        .ok_or(CredentialError::MissingCredential { field: "key-file" })?)
}

/// `.dockerconfigjson` content for one registry server
fn docker_config(server: &str, username: &str, password: &str) -> Result<Vec<u8>> {
    let auth = BASE64.encode(format!("{username}:{password}"));
    let config = serde_json::json!({
        "auths": {
            server: {
                "username": username,
                "password": password,
                "auth": auth,
            }
        }
    });
    Ok(serde_json::to_vec(&config)?)
}

/// Host (and port) part of a repository reference
pub fn registry_host(repository: &str) -> &str {
    let rest = repository
        .strip_prefix("https://")
        .or_else(|| repository.strip_prefix("http://"))
        .unwrap_or(repository);
    rest.split('/').next().unwrap_or(rest)
}
