//! Operator version resolution
//!
//! The version to install is, in order of preference:
//! 1. the override from the environment, which must validate (never falls through)
//! 2. the latest release from the discovery endpoint, if it validates
//! 3. the configured default, if it validates
//!
//! A version "validates" when its page under the validation URL template
//! answers 2xx.

use async_trait::async_trait;
use serde::Deserialize;

use apiop_core::{OperatorVersion, VersionOrigin, render_template};

use crate::error::{RepoError, Result, VersionError};
use crate::http::HttpClient;

/// Endpoints answering version questions
#[async_trait]
pub trait VersionSource: Send + Sync {
    /// Whether the version page at `url` exists
    async fn exists(&self, url: &str) -> Result<bool>;

    /// Raw latest version string published at `url`
    async fn latest(&self, url: &str) -> Result<String>;
}

/// GitHub release metadata (`/releases/latest`)
#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
}

/// Version source backed by HTTP endpoints
pub struct HttpVersionSource {
    client: HttpClient,
}

impl HttpVersionSource {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl VersionSource for HttpVersionSource {
    async fn exists(&self, url: &str) -> Result<bool> {
        self.client.exists(url).await
    }

    async fn latest(&self, url: &str) -> Result<String> {
        let body = self.client.get_text(url).await?;
        parse_latest(url, &body)
    }
}

/// Extract a version from a discovery response: GitHub release JSON or plain text
fn parse_latest(url: &str, body: &str) -> Result<String> {
    let trimmed = body.trim();
    if trimmed.starts_with('{') {
        let release: Release = serde_json::from_str(trimmed)?;
        return Ok(release.tag_name);
    }

    trimmed
        .lines()
        .next()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .ok_or_else(|| RepoError::InvalidResponse {
            url: url.to_string(),
            message: "empty response".to_string(),
        })
}

/// Override value from the environment, if set and not blank
pub fn env_override(env_var: &str) -> Option<String> {
    std::env::var(env_var).ok().filter(|v| !v.trim().is_empty())
}

/// What to resolve and where to look
#[derive(Debug, Clone)]
pub struct VersionQuery {
    /// Human-readable component name for messages
    pub component: String,
    /// Environment variable holding an override
    pub env_var: String,
    pub default_version: String,
    /// URL template with a `{version}` placeholder
    pub validation_url_template: String,
    pub discovery_url: String,
}

/// Resolves the operator version against a [`VersionSource`]
pub struct VersionResolver<'a> {
    source: &'a dyn VersionSource,
}

impl<'a> VersionResolver<'a> {
    pub fn new(source: &'a dyn VersionSource) -> Self {
        Self { source }
    }

    /// Resolve the version (`None` or blank override means no override)
    pub async fn resolve(
        &self,
        query: &VersionQuery,
        override_version: Option<&str>,
    ) -> std::result::Result<OperatorVersion, VersionError> {
        if let Some(raw) = override_version.filter(|v| !v.trim().is_empty()) {
            return self.resolve_override(query, raw).await;
        }

        let mut failures = Vec::new();

        match self.discover(query).await {
            Ok(version) => {
                tracing::info!(%version, component = %query.component, "using latest release");
                return Ok(version);
            }
            Err(reason) => {
                tracing::warn!(component = %query.component, %reason, "falling back to default version");
                failures.push(reason);
            }
        }

        let default = match OperatorVersion::parse(&query.default_version, VersionOrigin::Default) {
            Ok(version) => version,
            Err(e) => {
                failures.push(format!(
                    "default version '{}' is invalid: {e}",
                    query.default_version.trim()
                ));
                return Err(resolution_failed(query, failures));
            }
        };
        match self.check(query, &default).await {
            Ok(true) => {
                tracing::info!(version = %default, component = %query.component, "using default version");
                Ok(default)
            }
            Ok(false) => {
                failures.push(format!("default version {default} does not exist"));
                Err(resolution_failed(query, failures))
            }
            Err(e) => {
                failures.push(format!("default version {default} could not be validated: {e}"));
                Err(resolution_failed(query, failures))
            }
        }
    }

    async fn resolve_override(
        &self,
        query: &VersionQuery,
        raw: &str,
    ) -> std::result::Result<OperatorVersion, VersionError> {
        let version = parse(raw, VersionOrigin::Override)?;
        let shown = version.to_string();
        let rejected = |reason: String| VersionError::InvalidOverrideVersion {
            env_var: query.env_var.clone(),
            version: shown.clone(),
            reason,
        };

        match self.check(query, &version).await {
            Ok(true) => {
                tracing::info!(%version, env_var = %query.env_var, "using version override");
                Ok(version)
            }
            Ok(false) => Err(rejected("no such release".to_string())),
            Err(e) => Err(rejected(format!("could not validate: {e}"))),
        }
    }

    /// Latest validated release, or the reason there is none
    async fn discover(&self, query: &VersionQuery) -> std::result::Result<OperatorVersion, String> {
        let raw = self
            .source
            .latest(&query.discovery_url)
            .await
            .map_err(|e| format!("discovery failed: {e}"))?;

        let version = OperatorVersion::parse(&raw, VersionOrigin::Discovered)
            .map_err(|e| format!("discovered version '{raw}' is invalid: {e}"))?;

        match self.check(query, &version).await {
            Ok(true) => Ok(version),
            Ok(false) => Err(format!("discovered version {version} does not exist")),
            Err(e) => Err(format!("discovered version {version} could not be validated: {e}")),
        }
    }

    async fn check(&self, query: &VersionQuery, version: &OperatorVersion) -> Result<bool> {
        let url = render_template(&query.validation_url_template, version.as_str());
        tracing::debug!(%url, "validating version");
        self.source.exists(&url).await
    }
}

fn parse(raw: &str, origin: VersionOrigin) -> std::result::Result<OperatorVersion, VersionError> {
    OperatorVersion::parse(raw, origin).map_err(|e| VersionError::InvalidVersionFormat {
        version: raw.trim().to_string(),
        reason: e.to_string(),
    })
}

fn resolution_failed(query: &VersionQuery, failures: Vec<String>) -> VersionError {
    VersionError::VersionResolutionFailed {
        component: query.component.clone(),
        reason: failures.join("; "),
    }
}
