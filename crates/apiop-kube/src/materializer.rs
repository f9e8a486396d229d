//! Controller configuration with bounded retry
//!
//! The whole bundle is applied as one unit. A transient failure (API
//! throttling, server errors, conflicts, transport errors, or a resource
//! type whose CRD is not established yet) retries the same object set after
//! a fixed pause, with a fresh discovery cache. Anything else stops at once.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use apiop_core::{ManifestBundle, SecurityProfile};

use crate::error::{KubeError, Result};
use crate::manifest::{ManifestObject, defined_groups, parse_bundle};
use crate::resources::AppliedResource;

/// Applies parsed manifests to a cluster
#[async_trait]
pub trait ManifestApplier: Send {
    /// Apply every object, stopping at the first failure
    async fn apply(
        &mut self,
        objects: &[ManifestObject],
        default_namespace: &str,
    ) -> Result<Vec<AppliedResource>>;

    /// Re-read which resource types the cluster serves
    async fn refresh(&mut self) -> Result<()>;
}

/// Failure to materialize the controller configuration
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("manifest bundle {origin} could not be loaded: {source}")]
    Bundle {
        origin: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("manifest bundle {origin} is not valid: {source}")]
    InvalidManifest {
        origin: String,
        #[source]
        source: KubeError,
    },

    #[error("applying controller configuration failed on attempt {attempts}: {source}")]
    Terminal {
        attempts: u32,
        #[source]
        source: KubeError,
    },

    #[error("controller configuration not applied after {attempts} attempts: {last}")]
    ApplyExhausted {
        attempts: u32,
        #[source]
        last: Box<KubeError>,
    },
}

impl ApplyError {
    /// Number of apply attempts made
    pub fn attempts(&self) -> u32 {
        match self {
            ApplyError::Bundle { .. } | ApplyError::InvalidManifest { .. } => 0,
            ApplyError::Terminal { attempts, .. } | ApplyError::ApplyExhausted { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Whether a failed attempt is worth repeating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Transient,
    Terminal,
}

/// Classify an apply failure
///
/// Unknown resource types are transient only for groups the bundle is
/// expected to make available: the security profile's group and the groups
/// of CRDs in the same bundle.
pub fn classify(err: &KubeError, profile: &SecurityProfile, bundle_groups: &BTreeSet<String>) -> Failure {
    if let Some(group) = err.unknown_group() {
        return if group == profile.group() || bundle_groups.contains(group) {
            Failure::Transient
        } else {
            Failure::Terminal
        };
    }
    if err.is_transient() {
        Failure::Transient
    } else {
        Failure::Terminal
    }
}

/// Outcome of a successful apply
#[derive(Debug, Clone)]
pub struct ApplySummary {
    pub applied: Vec<AppliedResource>,
    pub attempts: u32,
    pub bundle_digest: String,
}

impl ApplySummary {
    pub fn created(&self) -> usize {
        self.applied.iter().filter(|r| r.created).count()
    }

    /// Human-readable summary
    pub fn summary(&self) -> String {
        let created = self.created();
        format!(
            "{} resources applied ({} created, {} configured)",
            self.applied.len(),
            created,
            self.applied.len() - created
        )
    }
}

/// Applies controller configuration bundles
#[derive(Debug, Clone)]
pub struct ConfigMaterializer {
    namespace: String,
    retry_interval: Duration,
}

impl ConfigMaterializer {
    pub fn new(namespace: impl Into<String>, retry_interval: Duration) -> Self {
        Self {
            namespace: namespace.into(),
            retry_interval,
        }
    }

    /// Apply `bundle`, retrying transient failures up to `retry_budget` attempts
    ///
    /// A budget of 0 is treated as 1.
    pub async fn apply(
        &self,
        applier: &mut dyn ManifestApplier,
        bundle: &ManifestBundle,
        retry_budget: u32,
        profile: &SecurityProfile,
    ) -> std::result::Result<ApplySummary, ApplyError> {
        let objects = parse_bundle(bundle).map_err(|source| ApplyError::InvalidManifest {
            origin: bundle.origin().to_string(),
            source,
        })?;
        let groups = defined_groups(&objects);
        let budget = retry_budget.max(1);

        tracing::info!(
            origin = bundle.origin(),
            objects = objects.len(),
            budget,
            "applying controller configuration"
        );

        let mut attempt = 1;
        loop {
            match applier.apply(&objects, &self.namespace).await {
                Ok(applied) => {
                    return Ok(ApplySummary {
                        applied,
                        attempts: attempt,
                        bundle_digest: bundle.digest(),
                    });
                }
                Err(e) => match classify(&e, profile, &groups) {
                    Failure::Terminal => {
                        return Err(ApplyError::Terminal {
                            attempts: attempt,
                            source: e,
                        });
                    }
                    Failure::Transient if attempt >= budget => {
                        return Err(ApplyError::ApplyExhausted {
                            attempts: attempt,
                            last: Box::new(e),
                        });
                    }
                    Failure::Transient => {
                        tracing::warn!(attempt, budget, error = %e, "apply failed, retrying");
                    }
                },
            }

            attempt += 1;
            tokio::time::sleep(self.retry_interval).await;
            if let Err(e) = applier.refresh().await {
                tracing::warn!(attempt, error = %e, "discovery refresh failed");
            }
        }
    }
}
