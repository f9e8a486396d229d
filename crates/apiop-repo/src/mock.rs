//! In-memory endpoints for testing
//!
//! Useful for exercising version resolution and bundle loading without
//! network access.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use apiop_core::ManifestBundle;

use crate::bundle::BundleFetcher;
use crate::error::{RepoError, Result};
use crate::version::VersionSource;

/// Counts of calls made, for assertions
#[derive(Debug, Default, Clone)]
pub struct SourceCounts {
    pub exists: usize,
    pub latest: usize,
}

/// Scripted version endpoints
#[derive(Clone, Default)]
pub struct MockVersionSource {
    latest: Option<String>,
    existing: BTreeSet<String>,
    validation_down: bool,
    counts: Arc<RwLock<SourceCounts>>,
}

impl MockVersionSource {
    /// No latest release, nothing exists
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latest(mut self, version: &str) -> Self {
        self.latest = Some(version.to_string());
        self
    }

    /// Versions whose validation page exists
    pub fn with_existing<'v>(mut self, versions: impl IntoIterator<Item = &'v str>) -> Self {
        self.existing.extend(versions.into_iter().map(String::from));
        self
    }

    /// Validation endpoint answers 503
    pub fn failing_validation(mut self) -> Self {
        self.validation_down = true;
        self
    }

    pub fn counts(&self) -> SourceCounts {
        self.counts.read().unwrap().clone()
    }
}

#[async_trait]
impl VersionSource for MockVersionSource {
    async fn exists(&self, url: &str) -> Result<bool> {
        self.counts.write().unwrap().exists += 1;
        if self.validation_down {
            return Err(RepoError::HttpError {
                status: 503,
                message: format!("Could not check {url}"),
            });
        }
        Ok(self
            .existing
            .iter()
            .any(|v| url.ends_with(&format!("/{v}"))))
    }

    async fn latest(&self, url: &str) -> Result<String> {
        self.counts.write().unwrap().latest += 1;
        self.latest.clone().ok_or_else(|| RepoError::NetworkError {
            message: format!("Connection failed: {url}"),
        })
    }
}

/// Serves bundle content from memory, keyed by URL
#[derive(Clone, Default)]
pub struct MockBundleFetcher {
    bundles: HashMap<String, Vec<u8>>,
    fetched: Arc<RwLock<Vec<String>>>,
}

impl MockBundleFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bundle(mut self, url: &str, content: impl Into<Vec<u8>>) -> Self {
        self.bundles.insert(url.to_string(), content.into());
        self
    }

    /// URLs requested so far, in order
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.read().unwrap().clone()
    }
}

#[async_trait]
impl BundleFetcher for MockBundleFetcher {
    async fn fetch(&self, url: &str) -> Result<ManifestBundle> {
        self.fetched.write().unwrap().push(url.to_string());
        let content = self.bundles.get(url).ok_or_else(|| RepoError::HttpError {
            status: 404,
            message: format!("Request to {url} failed"),
        })?;
        Ok(ManifestBundle::from_bytes(url, content)?)
    }
}
