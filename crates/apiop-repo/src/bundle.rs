//! Manifest bundle retrieval

use async_trait::async_trait;

use apiop_core::{ConfigSource, ManifestBundle};

use crate::error::Result;
use crate::http::HttpClient;

/// Downloads manifest bundles
#[async_trait]
pub trait BundleFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<ManifestBundle>;
}

/// Bundle download over HTTP; YAML or gzip archive
pub struct HttpBundleFetcher {
    client: HttpClient,
}

impl HttpBundleFetcher {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BundleFetcher for HttpBundleFetcher {
    async fn fetch(&self, url: &str) -> Result<ManifestBundle> {
        tracing::debug!(%url, "downloading manifest bundle");
        let data = self.client.get_bytes(url).await?;
        Ok(ManifestBundle::from_bytes(url, &data)?)
    }
}

/// Load the bundle a [`ConfigSource`] points at
pub async fn load_bundle(source: &ConfigSource, fetcher: &dyn BundleFetcher) -> Result<ManifestBundle> {
    let bundle = match source {
        ConfigSource::Local(path) => ManifestBundle::load(path)?,
        ConfigSource::Remote(url) => fetcher.fetch(url).await?,
    };
    tracing::info!(
        origin = bundle.origin(),
        documents = bundle.len(),
        digest = %bundle.digest(),
        "manifest bundle ready"
    );
    Ok(bundle)
}
