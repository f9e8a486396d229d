//! Tool configuration and operating mode
//!
//! Stored in `~/.config/apiop/config.yaml`. Every field is optional; a
//! missing file means defaults. The `mode` marker is shared with the rest of
//! the tool: installing the operator switches it to [`OperatingMode::Kubernetes`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CoreError, Result};
use crate::request::SecurityProfile;

/// Whether commands act on a local setup or the configured cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OperatingMode {
    #[default]
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "k8s")]
    Kubernetes,
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Kubernetes => "k8s",
        })
    }
}

/// Tool configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    #[serde(default)]
    pub mode: OperatingMode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode_changed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub operator: OperatorSettings,
}

impl ToolConfig {
    /// Load from `path`, or the default location; defaults if the file is absent
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save with owner-only permissions on Unix
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            let mut options = std::fs::OpenOptions::new();
            options.write(true).create(true).truncate(true).mode(0o600);
            std::io::Write::write_all(&mut options.open(path)?, content.as_bytes())?;
        }

        #[cfg(not(unix))]
        {
            std::fs::write(path, content)?;
        }

        Ok(())
    }

    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| CoreError::InvalidConfig {
            message: "Could not determine config directory".to_string(),
        })?;
        Ok(config_dir.join("apiop").join("config.yaml"))
    }
}

/// Where and how the operator is installed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperatorSettings {
    /// Namespace the operator and its configuration live in
    pub namespace: String,
    /// Environment variable pinning the operator version
    pub version_env: String,
    /// Version used when discovery is unavailable
    pub default_version: String,
    /// URL template answering 2xx for existing versions (`{version}`)
    pub validation_url: String,
    /// URL returning the latest release
    pub discovery_url: String,
    /// URL template of the manifest bundle (`{version}`)
    pub bundle_url: String,
    /// Apply attempts before giving up
    pub retry_budget: u32,
    /// Pause between apply attempts
    #[serde(with = "humantime_serde")]
    pub retry_interval: Duration,
    /// CRD the controller configuration waits for
    pub security_crd: SecurityProfile,
    /// Config map holding the controller's registry settings
    pub controller_config: String,
}

impl Default for OperatorSettings {
    fn default() -> Self {
        Self {
            namespace: "wso2-system".to_string(),
            version_env: "API_OPERATOR_VERSION".to_string(),
            default_version: "v1.2.0".to_string(),
            validation_url: "https://github.com/wso2/k8s-api-operator/tree/{version}".to_string(),
            discovery_url: "https://api.github.com/repos/wso2/k8s-api-operator/releases/latest"
                .to_string(),
            bundle_url: "https://github.com/wso2/k8s-api-operator/releases/download/{version}/api-operator-configs.yaml"
                .to_string(),
            retry_budget: 20,
            retry_interval: Duration::from_secs(2),
            security_crd: SecurityProfile::default(),
            controller_config: "controller-config".to_string(),
        }
    }
}

/// Persistent operating-mode marker
pub trait ModeStore {
    fn current(&self) -> Result<OperatingMode>;

    fn set(&mut self, mode: OperatingMode) -> Result<()>;
}

/// Mode marker kept in the tool configuration file
#[derive(Debug, Clone)]
pub struct FileModeStore {
    path: PathBuf,
}

impl FileModeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ModeStore for FileModeStore {
    fn current(&self) -> Result<OperatingMode> {
        Ok(ToolConfig::load(Some(&self.path))?.mode)
    }

    fn set(&mut self, mode: OperatingMode) -> Result<()> {
        let mut config = ToolConfig::load(Some(&self.path))?;
        if config.mode != mode {
            config.mode_changed_at = Some(Utc::now());
        }
        config.mode = mode;
        config.save_to(&self.path)?;
        tracing::debug!(path = %self.path.display(), %mode, "operating mode saved");
        Ok(())
    }
}

/// In-memory mode marker for tests
#[derive(Debug, Clone, Default)]
pub struct MemoryModeStore {
    mode: OperatingMode,
    /// Number of `set` calls
    pub writes: usize,
}

impl MemoryModeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModeStore for MemoryModeStore {
    fn current(&self) -> Result<OperatingMode> {
        Ok(self.mode)
    }

    fn set(&mut self, mode: OperatingMode) -> Result<()> {
        self.mode = mode;
        self.writes += 1;
        Ok(())
    }
}
