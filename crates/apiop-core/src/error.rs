//! Core error types

use std::path::PathBuf;
use thiserror::Error;

use crate::registry::{FlagName, RegistryType};

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Manifest bundle not found: {path}")]
    BundleNotFound { path: String },

    #[error("Invalid manifest bundle: {message}")]
    InvalidBundle { message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid version: {0}")]
    InvalidVersion(#[from] semver::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Batch flag combination rejected for a registry type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unknown registry type '{name}'{}", suggestion_suffix(.suggestion))]
    UnknownRegistryType {
        name: String,
        suggestion: Option<String>,
    },

    #[error("{flag} is required for registry type {registry}")]
    MissingRequired {
        registry: RegistryType,
        flag: FlagName,
    },

    #[error("{flag} is not accepted for registry type {registry}")]
    UnexpectedFlag {
        registry: RegistryType,
        flag: FlagName,
    },

    #[error("only one of {} may be given for registry type {registry}", format_flags(.flags))]
    ConflictingFlags {
        registry: RegistryType,
        flags: Vec<FlagName>,
    },

    #[error("one of --password, --password-stdin or --key-file is required for registry type {registry}")]
    MissingPasswordSource { registry: RegistryType },
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(", did you mean '{s}'?"),
        None => String::new(),
    }
}

fn format_flags(flags: &[FlagName]) -> String {
    flags
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failure while turning validated inputs or prompts into credentials
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("{field} must not be empty")]
    MissingCredential { field: &'static str },

    #[error("failed to read password from stdin: {0}")]
    StdinRead(#[source] std::io::Error),

    #[error("credentials file '{}' is not readable: {source}", .path.display())]
    KeyFileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("input cancelled")]
    PromptCancelled,

    #[error(transparent)]
    Validation(#[from] ValidationError),
}
