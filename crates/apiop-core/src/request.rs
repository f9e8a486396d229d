//! Installation request types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::Result;

/// Placeholder substituted with the operator version in URL templates
pub const VERSION_PLACEHOLDER: &str = "{version}";

/// Where the controller manifests come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// `--from-file`: a YAML file, a directory of YAML files or a bundle archive
    Local(PathBuf),
    /// Bundle URL rendered from the template with a resolved version
    Remote(String),
}

impl ConfigSource {
    /// Render a remote source from a URL template
    pub fn remote(template: &str, version: &OperatorVersion) -> Self {
        Self::Remote(render_template(template, version.as_str()))
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => f.write_str(url),
        }
    }
}

/// Substitute `{version}` in a template
pub fn render_template(template: &str, version: &str) -> String {
    template.replace(VERSION_PLACEHOLDER, version)
}

/// CRD the controller configuration depends on (`<plural>.<group>`)
///
/// Resources of the CRD's group cannot be applied until the CRDs installed by
/// the same bundle are established, so "unknown resource type" errors for
/// that group are worth retrying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecurityProfile(pub String);

impl SecurityProfile {
    pub fn new(crd: impl Into<String>) -> Self {
        Self(crd.into())
    }

    /// API group of the CRD
    pub fn group(&self) -> &str {
        self.0.split_once('.').map_or(self.0.as_str(), |(_, group)| group)
    }
}

impl Default for SecurityProfile {
    fn default() -> Self {
        Self::new("security.wso2.com")
    }
}

/// How an operator version was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOrigin {
    Override,
    Discovered,
    Default,
}

impl fmt::Display for VersionOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Override => "environment override",
            Self::Discovered => "latest release",
            Self::Default => "default",
        })
    }
}

/// A resolved operator version; immutable once built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorVersion {
    version: String,
    origin: VersionOrigin,
}

impl OperatorVersion {
    /// Build from a version string, checking it looks like `[v]MAJOR.MINOR.PATCH`
    pub fn parse(version: &str, origin: VersionOrigin) -> Result<Self> {
        let version = version.trim();
        semver::Version::parse(version.strip_prefix('v').unwrap_or(version))?;
        Ok(Self {
            version: version.to_string(),
            origin,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.version
    }

    pub fn origin(&self) -> VersionOrigin {
        self.origin
    }
}

impl fmt::Display for OperatorVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.version)
    }
}

/// One installation, built by the orchestrator and consumed by the
/// materializer
#[derive(Debug, Clone)]
pub struct InstallationRequest {
    pub config_source: ConfigSource,
    pub retry_budget: u32,
    pub security_profile: SecurityProfile,
    pub version: Option<OperatorVersion>,
}

impl InstallationRequest {
    pub fn is_local_install(&self) -> bool {
        self.config_source.is_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_version_parse() {
        let v = OperatorVersion::parse("v1.2.0", VersionOrigin::Default).unwrap();
        assert_eq!(v.as_str(), "v1.2.0");
        assert_eq!(v.origin(), VersionOrigin::Default);

        assert!(OperatorVersion::parse("1.2.3-rc1", VersionOrigin::Override).is_ok());
        assert!(OperatorVersion::parse("latest", VersionOrigin::Override).is_err());
        assert!(OperatorVersion::parse("v1.2", VersionOrigin::Override).is_err());
    }

    #[test]
    fn test_remote_source_from_template() {
        let v = OperatorVersion::parse("v1.2.0", VersionOrigin::Discovered).unwrap();
        let source = ConfigSource::remote(
            "https://example.com/releases/download/{version}/configs.yaml",
            &v,
        );
        assert_eq!(
            source,
            ConfigSource::Remote(
                "https://example.com/releases/download/v1.2.0/configs.yaml".to_string()
            )
        );
        assert!(!source.is_local());
    }

    #[test]
    fn test_security_profile_group() {
        assert_eq!(SecurityProfile::default().group(), "wso2.com");
        assert_eq!(SecurityProfile::new("ratelimits.ratelimit.wso2.com").group(), "ratelimit.wso2.com");
        assert_eq!(SecurityProfile::new("bare").group(), "bare");
    }
}
