//! apiop Kubernetes integration
//!
//! This crate applies the API Operator's controller configuration and stores
//! registry credentials in the cluster:
//!
//! - **Manifests**: bundle documents parsed up front and applied with
//!   Server-Side Apply, Namespaces first, then CRDs, then the rest
//! - **Materializer**: bounded retry of the whole bundle, with transient and
//!   terminal failures told apart by API status
//! - **Secrets**: docker config or opaque secrets per registry type, plus
//!   the controller config map
//! - **Mocks**: in-memory applier and secret store for tests

pub mod error;
pub mod manifest;
pub mod materializer;
pub mod mock;
pub mod resources;
pub mod secrets;

pub use error::{KubeError, Result};
pub use manifest::{ManifestObject, parse_bundle};
pub use materializer::{
    ApplyError, ApplySummary, ConfigMaterializer, Failure, ManifestApplier, classify,
};
pub use mock::{MockApplier, MockSecretStore, ScriptedFailure};
pub use resources::{AppliedResource, ResourceManager};
pub use secrets::{
    KubeSecretStore, PersistError, PersistReport, SecretPersister, SecretSpec, SecretStore,
};
