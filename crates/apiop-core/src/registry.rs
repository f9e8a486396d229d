//! Registry types and the flag rules attached to each of them
//!
//! Every registry type carries its own rule set: which flags it needs,
//! which ones it refuses, and how it treats the password-source group
//! (`--password`, `--password-stdin`, `--key-file`). Adding a registry
//! means adding a variant here and its arm in [`RegistryType::rules`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Maximum edit distance for "did you mean" suggestions
const MAX_SUGGESTION_DISTANCE: usize = 3;

/// Container registry the operator pushes built images to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistryType {
    DockerHub,
    AmazonEcr,
    Gcr,
    #[serde(rename = "HTTP")]
    Http,
}

impl RegistryType {
    /// All registry types, in the order they are offered interactively
    pub const ALL: [RegistryType; 4] = [
        RegistryType::DockerHub,
        RegistryType::AmazonEcr,
        RegistryType::Gcr,
        RegistryType::Http,
    ];

    /// Name used on the command line and in the controller config
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DockerHub => "DOCKER_HUB",
            Self::AmazonEcr => "AMAZON_ECR",
            Self::Gcr => "GCR",
            Self::Http => "HTTP",
        }
    }

    /// Human readable label for prompts
    pub const fn label(&self) -> &'static str {
        match self {
            Self::DockerHub => "Docker Hub",
            Self::AmazonEcr => "Amazon ECR",
            Self::Gcr => "Google Container Registry",
            Self::Http => "HTTP private registry",
        }
    }

    /// Flag rules for this registry type
    pub const fn rules(&self) -> FlagRules {
        match self {
            Self::DockerHub => FlagRules {
                required: &[FlagName::Repository, FlagName::Username],
                forbidden: &[],
                password: PasswordPolicy::Required,
            },
            Self::AmazonEcr | Self::Gcr => FlagRules {
                required: &[FlagName::Repository, FlagName::KeyFile],
                forbidden: &[
                    FlagName::Username,
                    FlagName::Password,
                    FlagName::PasswordStdin,
                ],
                password: PasswordPolicy::Forbidden,
            },
            Self::Http => FlagRules {
                required: &[FlagName::Repository],
                forbidden: &[],
                password: PasswordPolicy::WithUsername,
            },
        }
    }

    /// Closest known registry name to `input`, if any is near enough
    pub fn suggest(input: &str) -> Option<&'static str> {
        let input = input.to_ascii_uppercase();
        Self::ALL
            .iter()
            .map(|r| (r.as_str(), strsim::levenshtein(&input, r.as_str())))
            .filter(|(_, distance)| *distance <= MAX_SUGGESTION_DISTANCE)
            .min_by_key(|(_, distance)| *distance)
            .map(|(name, _)| name)
    }
}

impl fmt::Display for RegistryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistryType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == normalized)
            .ok_or_else(|| ValidationError::UnknownRegistryType {
                name: s.to_string(),
                suggestion: Self::suggest(&normalized).map(str::to_string),
            })
    }
}

/// Batch-mode flags that carry registry inputs (registry type excluded)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FlagName {
    Repository,
    Username,
    Password,
    PasswordStdin,
    KeyFile,
}

impl FlagName {
    pub const ALL: [FlagName; 5] = [
        FlagName::Repository,
        FlagName::Username,
        FlagName::Password,
        FlagName::PasswordStdin,
        FlagName::KeyFile,
    ];

    /// Members of the mutually exclusive password-source group
    pub const PASSWORD_SOURCES: [FlagName; 3] =
        [FlagName::Password, FlagName::PasswordStdin, FlagName::KeyFile];

    /// Long flag name without the leading dashes
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Repository => "repository",
            Self::Username => "username",
            Self::Password => "password",
            Self::PasswordStdin => "password-stdin",
            Self::KeyFile => "key-file",
        }
    }
}

impl fmt::Display for FlagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "--{}", self.as_str())
    }
}

/// How a registry type treats the password-source group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordPolicy {
    /// Exactly one source must be given
    Required,
    /// Password sources (and username/password) are not accepted;
    /// `--key-file` is then a plain required flag
    Forbidden,
    /// Optional; when present it comes together with `--username`
    WithUsername,
}

/// Flag rule set of a registry type
#[derive(Debug, Clone, Copy)]
pub struct FlagRules {
    pub required: &'static [FlagName],
    pub forbidden: &'static [FlagName],
    pub password: PasswordPolicy,
}

impl FlagRules {
    /// Whether `flag` means anything for this registry type
    pub fn accepts(&self, flag: FlagName) -> bool {
        !self.forbidden.contains(&flag)
    }

    pub fn requires(&self, flag: FlagName) -> bool {
        self.required.contains(&flag)
    }
}
